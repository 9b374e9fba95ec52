//! # Discount Calculator
//!
//! Computes the bundle discount `D` and each line's raw adjustment.
//!
//! ## Policies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PERCENT (rate r)                                                       │
//! │    D     = round(S × r)                                                 │
//! │    adj_i = -round(S_i × r)                                              │
//! │                                                                         │
//! │  FIXED (price P for one bundle, B bundles)                              │
//! │    D     = max(S - P × B, 0)          never a markup                    │
//! │    adj_i = -round(D × basis_i / Σ basis)                                │
//! │    basis_i = S_i × weight_i           (weight defaults to 1)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The raw adjustments may not add up to `-D`; see [`super::reconcile`].

use serde::{Deserialize, Serialize};

use crate::error::{PricingError, PricingResult, ValidationError};
use crate::money::Money;
use crate::types::{DiscountPolicy, Rate};

use super::aggregate::Subtotals;

/// Discount total and unreconciled per-line adjustments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDiscount {
    /// `D`, always >= 0.
    pub total: Money,
    /// `adj_i` in line order, each <= 0.
    pub adjustments: Vec<Money>,
}

/// Applies the bundle's discount policy to the aggregated subtotals.
pub fn calculate(
    bundle_id: &str,
    policy: &DiscountPolicy,
    subtotals: &Subtotals,
    multiplier: i64,
) -> PricingResult<RawDiscount> {
    policy.validate()?;

    match *policy {
        DiscountPolicy::Percent { rate_bps } => {
            Ok(percent_discount(subtotals, Rate::from_bps(rate_bps)))
        }
        DiscountPolicy::Fixed { amount_cents } => {
            fixed_discount(bundle_id, subtotals, Money::from_cents(amount_cents), multiplier)
        }
    }
}

fn percent_discount(subtotals: &Subtotals, rate: Rate) -> RawDiscount {
    RawDiscount {
        total: subtotals.total.percent(rate),
        adjustments: subtotals
            .lines
            .iter()
            .map(|line| -line.subtotal.percent(rate))
            .collect(),
    }
}

fn fixed_discount(
    bundle_id: &str,
    subtotals: &Subtotals,
    fixed_price: Money,
    multiplier: i64,
) -> PricingResult<RawDiscount> {
    if subtotals.total.is_zero() {
        return Err(PricingError::ZeroSubtotalProration {
            bundle_id: bundle_id.to_string(),
        });
    }

    let bundle_price_total =
        fixed_price
            .checked_mul_quantity(multiplier)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "bundle price total".to_string(),
                min: 0,
                max: i64::MAX,
            })?;

    let total = if subtotals.total > bundle_price_total {
        subtotals.total - bundle_price_total
    } else {
        Money::zero()
    };

    if total.is_zero() {
        return Ok(RawDiscount {
            total,
            adjustments: vec![Money::zero(); subtotals.lines.len()],
        });
    }

    let bases: Vec<i128> = subtotals
        .lines
        .iter()
        .map(|line| line.subtotal.cents() as i128 * line.weight as i128)
        .collect();
    let basis_total: i128 = bases.iter().sum();

    let mut adjustments = Vec::with_capacity(bases.len());
    for (line, basis) in subtotals.lines.iter().zip(&bases) {
        let share = total.prorate(*basis, basis_total);
        if share > line.subtotal {
            return Err(PricingError::ProrationOverrun {
                component_id: line.component_id.clone(),
                discount_cents: share.cents(),
                subtotal_cents: line.subtotal.cents(),
            });
        }
        adjustments.push(-share);
    }

    Ok(RawDiscount { total, adjustments })
}
