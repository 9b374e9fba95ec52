//! # Repository Module
//!
//! Database repositories for the bundle pricing system.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ComponentRepository   components (price, availability)                 │
//! │  BundleRepository      bundles + bundle_items (draft edits, lifecycle)  │
//! │  PromotionRepository   promotions                                       │
//! │  OrderRepository       orders; reads order_lines + line_adjustments     │
//! │                                                                         │
//! │  BundleOrderService    writes order_lines + line_adjustments            │
//! │  (crate::service)      one transaction per bundle instance              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each repository also exposes `pub(crate)` helpers that take a
//! `&mut SqliteConnection`, so the service can run them inside its own
//! transaction.

pub mod bundle;
pub mod component;
pub mod order;
pub mod promotion;
