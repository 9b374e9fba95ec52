//! # Validation Module
//!
//! Input validation run before any pricing or persistence.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: This module                                                   │
//! │  ├── names, SKUs, quantities, rates, weights                           │
//! │  └── rejects bad input with a field-level reason                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: pricing::allocator                                           │
//! │  └── missing prices, zero subtotals, reconciliation                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── CHECK constraints                                                 │
//! │  └── Foreign keys (ON DELETE RESTRICT for bundle components)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::Rate;
use crate::{MAX_BUNDLE_ITEMS, MAX_BUNDLE_QUANTITY, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a component SKU.
///
/// ## Example
/// ```rust
/// use bundle_core::validation::validate_sku;
///
/// assert!(validate_sku("TEA-GREEN-50").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a display name for a bundle, component or promotion.
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates the bundle multiplier passed to add/adjust.
///
/// `0` is not valid here; adjust-to-zero is handled as a removal before
/// validation runs.
pub fn validate_bundle_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "bundle quantity".to_string(),
        });
    }

    if qty > MAX_BUNDLE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "bundle quantity".to_string(),
            min: 1,
            max: MAX_BUNDLE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates the per-bundle quantity of one component.
pub fn validate_item_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "item quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "item quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items).
///
/// ## Example
/// ```rust
/// use bundle_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(3000).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-1).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a rate in basis points (0% to 100%).
pub fn validate_rate_bps(field: &str, bps: u32) -> ValidationResult<()> {
    if bps > Rate::FULL_BPS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: Rate::FULL_BPS as i64,
        });
    }

    Ok(())
}

/// Validates an optional proration weight. Zero weights are rejected: a
/// zero-weight line would never absorb any of the fixed-price discount.
pub fn validate_weight(weight: Option<u32>) -> ValidationResult<()> {
    match weight {
        Some(0) => Err(ValidationError::MustBePositive {
            field: "weight".to_string(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of items already in a bundle before adding one more.
pub fn validate_bundle_size(current_items: usize) -> ValidationResult<()> {
    if current_items >= MAX_BUNDLE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "bundle items".to_string(),
            min: 0,
            max: MAX_BUNDLE_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string (entity ids and bundle keys).
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
