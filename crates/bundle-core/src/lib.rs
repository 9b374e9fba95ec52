//! # bundle-core: Pure Bundle Pricing Logic
//!
//! Prices bundles of components sold as one set. A bundle added to an order
//! becomes one cosmetic header line plus one real line per component, and
//! the bundle discount is spread across those component lines so that the
//! per-line adjustments add up to the bundle discount to the cent.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        bundle-db (repositories, BundleOrderService)             │   │
//! │  │   addBundle / adjustBundle / removeBundle, stacking hook        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ snapshots in, priced lines out         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ bundle-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   money   │  │  pricing  │  │ lifecycle │  │ validation│  │   │
//! │  │   │   Money   │  │ allocator │  │  publish  │  │   rules   │  │   │
//! │  │   │   Rate    │  │   guard   │  │  archive  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (BundleDefinition, Component, OrderLineSnapshot, etc.)
//! - [`money`] - Money type and the rounding rule
//! - [`pricing`] - Aggregator, calculator, reconciler, guard, allocator
//! - [`lifecycle`] - Bundle status transitions
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use bundle_core::money::Money;
//! use bundle_core::pricing::{allocate, PricedComponent};
//! use bundle_core::types::{DiscountPolicy, Rate};
//!
//! let components = vec![
//!     PricedComponent {
//!         component_id: "A".into(),
//!         unit_price: Some(Money::from_cents(3000)),
//!         quantity: 1,
//!         weight: None,
//!         display_order: 0,
//!     },
//!     PricedComponent {
//!         component_id: "B".into(),
//!         unit_price: Some(Money::from_cents(4500)),
//!         quantity: 1,
//!         weight: None,
//!         display_order: 1,
//!     },
//! ];
//!
//! let policy = DiscountPolicy::percent(Rate::from_percent(20));
//! let allocation = allocate("bundle-1", &policy, &components, 3).unwrap();
//!
//! assert_eq!(allocation.discount.cents(), 4500);
//! assert_eq!(allocation.adjustment_total().cents(), -4500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod lifecycle;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{PricingError, PricingResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of bundles in one add or adjust.
///
/// Guards against typos like 1000 instead of 10.
pub const MAX_BUNDLE_QUANTITY: i64 = 999;

/// Maximum units of one component per bundle.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum number of component items in a bundle definition.
pub const MAX_BUNDLE_ITEMS: usize = 50;
