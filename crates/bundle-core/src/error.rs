//! # Error Types
//!
//! Domain error types for bundle-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bundle-core errors (this file)                                        │
//! │  ├── PricingError     - Allocator and lifecycle failures               │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  bundle-db errors (separate crate)                                     │
//! │  └── DbError          - Database failures, wraps PricingError          │
//! │                                                                         │
//! │  Flow: ValidationError → PricingError → DbError → caller               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Who Sees What
//! - Rejected mutations (missing price, zero subtotal, bad input) carry a
//!   human-readable reason for the shopper or admin.
//! - `ReconciliationViolation` is an operator alert. It is logged with the
//!   offending values and reported to callers only as an internal error.

use thiserror::Error;

use crate::types::BundleStatus;

// =============================================================================
// Pricing Error
// =============================================================================

/// Errors raised while pricing or publishing a bundle.
#[derive(Debug, Error)]
pub enum PricingError {
    /// A component has no unit price snapshot.
    ///
    /// The whole add/adjust fails; nothing is partially applied.
    #[error("Component {component_id} has no price; bundle cannot be priced")]
    MissingPriceSnapshot { component_id: String },

    /// Fixed-price proration over a zero subtotal.
    #[error("Bundle {bundle_id} has a zero subtotal; fixed price cannot be prorated")]
    ZeroSubtotalProration { bundle_id: String },

    /// Weighted fixed-price proration would push a line below zero.
    #[error("Weighted proration discounts component {component_id} by {discount_cents} cents, more than its subtotal of {subtotal_cents}")]
    ProrationOverrun {
        component_id: String,
        discount_cents: i64,
        subtotal_cents: i64,
    },

    /// `Σadj_i == -D` failed after correction. Indicates a defect.
    #[error("Reconciliation violation on bundle {bundle_id}: expected adjustments of {expected_cents}, got {actual_cents}")]
    ReconciliationViolation {
        bundle_id: String,
        expected_cents: i64,
        actual_cents: i64,
    },

    /// A referenced component is not currently sellable.
    #[error("Component {component_id} is unavailable")]
    ComponentUnavailable { component_id: String },

    /// Status change not allowed by the lifecycle table.
    #[error("Bundle {bundle_id} cannot move from {from} to {to}")]
    InvalidTransition {
        bundle_id: String,
        from: BundleStatus,
        to: BundleStatus,
    },

    /// Bundle must be Active to be added to an order.
    #[error("Bundle {bundle_id} is {status}, not active")]
    BundleNotActive {
        bundle_id: String,
        status: BundleStatus,
    },

    /// Bundle has no items to publish or price.
    #[error("Bundle {bundle_id} has no items")]
    EmptyBundle { bundle_id: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl PricingError {
    /// Returns true for rejections the end user should see a reason for.
    ///
    /// Reconciliation violations are defects and stay operator-facing.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, PricingError::ReconciliationViolation { .. })
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any pricing runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

/// Convenience alias for allocator results.
pub type PricingResult<T> = Result<T, PricingError>;

// =============================================================================
// Unit Tests
// =============================================================================
