//! # Pricing Pipeline
//!
//! The four stages that turn a bundle into priced order lines, plus the
//! guard consulted when other promotions meet a bundle line.
//!
//! - [`aggregate`] - Price Aggregator (`S_i`, `S`)
//! - [`calculate`] - Discount Calculator (`D`, raw `adj_i`)
//! - [`reconcile`] - Rounding Reconciler (drift correction, postcondition)
//! - [`guard`] - Promotion Guard (stacking precedence, cap clamping)
//! - [`allocator`] - the stages chained together

pub mod aggregate;
pub mod allocator;
pub mod calculate;
pub mod guard;
pub mod reconcile;

pub use aggregate::{aggregate, price_components, LineSubtotal, PricedComponent, Subtotals};
pub use allocator::{allocate, allocate_definition, AllocatedLine, Allocation};
pub use calculate::{calculate, RawDiscount};
pub use guard::{
    clamp_to_cap, evaluate, resolve_stacking, stacked_amount, DecidedBy, LineRates,
    StackingDecision, StackingVerdict,
};
pub use reconcile::{drift_order, drift_target, reconcile, verify, Reconciliation};
