//! # Price Aggregator
//!
//! Turns bundle items plus pricing quotes into per-line subtotals.
//!
//! ```text
//! S_i = price_i × quantity_i × B        S = Σ S_i
//! ```
//!
//! Fails closed: one missing price rejects the whole aggregation.

use serde::{Deserialize, Serialize};

use crate::error::{PricingError, PricingResult, ValidationError};
use crate::money::Money;
use crate::types::{BundleItem, ComponentQuote};
use crate::validation::{
    validate_bundle_quantity, validate_item_quantity, validate_price_cents, validate_weight,
};

/// A bundle item joined with its unit price snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedComponent {
    pub component_id: String,
    /// `None` when no price snapshot exists.
    pub unit_price: Option<Money>,
    /// Units per bundle.
    pub quantity: i64,
    pub weight: Option<u32>,
    pub display_order: i32,
}

/// Subtotal of one component line for a given multiplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSubtotal {
    pub component_id: String,
    pub display_order: i32,
    pub unit_price: Money,
    /// Total units on the line (`quantity_i × B`).
    pub units: i64,
    /// Proration weight, 1 when unset.
    pub weight: u32,
    pub subtotal: Money,
}

/// Output of the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtotals {
    pub lines: Vec<LineSubtotal>,
    pub total: Money,
}

/// Joins bundle items with pricing quotes, ordered by display order.
///
/// ## Errors
/// - `ComponentUnavailable` when a quote marks the component unavailable
/// - `MissingPriceSnapshot` when a quote is missing or carries no price
pub fn price_components(
    items: &[BundleItem],
    quotes: &[ComponentQuote],
) -> PricingResult<Vec<PricedComponent>> {
    let mut priced = Vec::with_capacity(items.len());

    for item in items {
        let quote = quotes
            .iter()
            .find(|q| q.component_id == item.component_id)
            .ok_or_else(|| PricingError::MissingPriceSnapshot {
                component_id: item.component_id.clone(),
            })?;

        if !quote.available {
            return Err(PricingError::ComponentUnavailable {
                component_id: item.component_id.clone(),
            });
        }

        let unit_price = quote
            .unit_price_cents
            .ok_or_else(|| PricingError::MissingPriceSnapshot {
                component_id: item.component_id.clone(),
            })?;

        priced.push(PricedComponent {
            component_id: item.component_id.clone(),
            unit_price: Some(Money::from_cents(unit_price)),
            quantity: item.quantity,
            weight: item.weight,
            display_order: item.display_order,
        });
    }

    priced.sort_by_key(|c| c.display_order);
    Ok(priced)
}

/// Computes `S_i` for each component and the bundle subtotal `S`.
///
/// Pure and deterministic: identical snapshots give identical subtotals.
pub fn aggregate(components: &[PricedComponent], multiplier: i64) -> PricingResult<Subtotals> {
    validate_bundle_quantity(multiplier)?;

    let mut lines = Vec::with_capacity(components.len());
    let mut total = Money::zero();

    for component in components {
        let unit_price =
            component
                .unit_price
                .ok_or_else(|| PricingError::MissingPriceSnapshot {
                    component_id: component.component_id.clone(),
                })?;
        validate_price_cents(unit_price.cents())?;
        validate_item_quantity(component.quantity)?;
        validate_weight(component.weight)?;

        let units = component
            .quantity
            .checked_mul(multiplier)
            .ok_or_else(|| overflow("line quantity"))?;
        let subtotal = unit_price
            .checked_mul_quantity(units)
            .ok_or_else(|| overflow("line subtotal"))?;
        total = Money::from_cents(
            total
                .cents()
                .checked_add(subtotal.cents())
                .ok_or_else(|| overflow("bundle subtotal"))?,
        );

        lines.push(LineSubtotal {
            component_id: component.component_id.clone(),
            display_order: component.display_order,
            unit_price,
            units,
            weight: component.weight.unwrap_or(1),
            subtotal,
        });
    }

    Ok(Subtotals { lines, total })
}

fn overflow(field: &str) -> PricingError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
    .into()
}
