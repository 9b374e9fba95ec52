//! # Bundle Allocator
//!
//! Runs the full pricing pipeline for one bundle instance:
//!
//! ```text
//! ┌────────────┐    ┌────────────┐    ┌────────────┐    ┌────────────┐
//! │ aggregate  │───►│ calculate  │───►│ reconcile  │───►│  verify    │
//! │  S_i, S    │    │  D, adj_i  │    │  + drift   │    │ Σadj == -D │
//! └────────────┘    └────────────┘    └────────────┘    └────────────┘
//! ```
//!
//! The result is a set of priced component lines ready to be written as
//! one atomic unit. No I/O happens here; callers supply price snapshots.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PricingError, PricingResult};
use crate::lifecycle::ensure_sellable;
use crate::money::Money;
use crate::types::{BundleDefinition, ComponentQuote, DiscountPolicy, Rate};

use super::aggregate::{aggregate, price_components, PricedComponent};
use super::calculate::calculate;
use super::reconcile::{reconcile, verify};

/// One priced component line of a bundle instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedLine {
    pub component_id: String,
    pub display_order: i32,
    /// Total units on the line (`quantity_i × B`).
    pub quantity: i64,
    pub base_unit_price: Money,
    pub subtotal: Money,
    /// Reconciled bundle adjustment (<= 0).
    pub adjustment: Money,
    /// `price × (1 - rate)` for percent, `price × net / subtotal` for fixed.
    pub effective_unit_price: Money,
    pub discount_rate: Rate,
}

impl AllocatedLine {
    /// Line total after the bundle adjustment.
    pub fn net(&self) -> Money {
        self.subtotal + self.adjustment
    }
}

/// Output of [`allocate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub bundle_id: String,
    pub multiplier: i64,
    pub subtotal: Money,
    pub discount: Money,
    /// Correction applied by the reconciler (zero when shares were exact).
    pub drift: Money,
    pub lines: Vec<AllocatedLine>,
}

impl Allocation {
    pub fn adjustment_total(&self) -> Money {
        self.lines.iter().map(|l| l.adjustment).sum()
    }
}

/// Prices `multiplier` copies of a bundle from already-joined components.
///
/// ## Errors
/// - `MissingPriceSnapshot` if any component has no price
/// - `ZeroSubtotalProration` for a fixed policy over a zero subtotal
/// - `ProrationOverrun` if a weighted share exceeds its line
/// - `ReconciliationViolation` if the postcondition fails (a defect)
pub fn allocate(
    bundle_id: &str,
    policy: &DiscountPolicy,
    components: &[PricedComponent],
    multiplier: i64,
) -> PricingResult<Allocation> {
    if components.is_empty() {
        return Err(PricingError::EmptyBundle {
            bundle_id: bundle_id.to_string(),
        });
    }

    let subtotals = aggregate(components, multiplier)?;
    let raw = calculate(bundle_id, policy, &subtotals, multiplier)?;
    let reconciled = reconcile(raw.total, &subtotals.lines, raw.adjustments);
    verify(bundle_id, raw.total, &subtotals.lines, &reconciled.adjustments)?;

    if !reconciled.drift.is_zero() {
        debug!(
            bundle_id = %bundle_id,
            drift_cents = reconciled.drift.cents(),
            line = ?reconciled.corrected_line,
            "Applied rounding drift correction"
        );
    }

    let lines = subtotals
        .lines
        .iter()
        .zip(&reconciled.adjustments)
        .map(|(line, adjustment)| {
            let (effective_unit_price, discount_rate) = match *policy {
                DiscountPolicy::Percent { rate_bps } => {
                    let rate = Rate::from_bps(rate_bps);
                    (line.unit_price.percent(rate.complement()), rate)
                }
                DiscountPolicy::Fixed { .. } if line.subtotal.is_zero() => {
                    (line.unit_price, Rate::zero())
                }
                DiscountPolicy::Fixed { .. } => {
                    let net = line.subtotal + *adjustment;
                    let effective = line
                        .unit_price
                        .prorate(net.cents() as i128, line.subtotal.cents() as i128);
                    (effective, (-*adjustment).rate_of(line.subtotal))
                }
            };

            AllocatedLine {
                component_id: line.component_id.clone(),
                display_order: line.display_order,
                quantity: line.units,
                base_unit_price: line.unit_price,
                subtotal: line.subtotal,
                adjustment: *adjustment,
                effective_unit_price,
                discount_rate,
            }
        })
        .collect();

    Ok(Allocation {
        bundle_id: bundle_id.to_string(),
        multiplier,
        subtotal: subtotals.total,
        discount: raw.total,
        drift: reconciled.drift,
        lines,
    })
}

/// Prices a bundle definition against current component quotes.
///
/// The definition must be `Active` and every component available.
pub fn allocate_definition(
    definition: &BundleDefinition,
    quotes: &[ComponentQuote],
    multiplier: i64,
) -> PricingResult<Allocation> {
    ensure_sellable(definition)?;
    let components = price_components(&definition.items, quotes)?;
    allocate(&definition.id, &definition.policy, &components, multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BundleItem, BundleOverride, BundleStatus};
    use chrono::Utc;

    fn components(prices: &[i64]) -> Vec<PricedComponent> {
        prices
            .iter()
            .enumerate()
            .map(|(i, cents)| PricedComponent {
                component_id: format!("C{}", i),
                unit_price: Some(Money::from_cents(*cents)),
                quantity: 1,
                weight: None,
                display_order: i as i32,
            })
            .collect()
    }

    fn definition(status: BundleStatus, policy: DiscountPolicy) -> BundleDefinition {
        let items = ["A", "B"]
            .iter()
            .enumerate()
            .map(|(i, id)| BundleItem {
                id: format!("item-{}", id),
                bundle_id: "bundle-1".to_string(),
                component_id: id.to_string(),
                quantity: 1,
                weight: None,
                display_order: i as i32,
            })
            .collect();
        BundleDefinition {
            id: "bundle-1".to_string(),
            name: "Starter Kit".to_string(),
            policy,
            status,
            version: 1,
            stacking: BundleOverride::Inherit,
            items,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn quotes() -> Vec<ComponentQuote> {
        vec![
            ComponentQuote {
                component_id: "A".to_string(),
                unit_price_cents: Some(3000),
                available: true,
            },
            ComponentQuote {
                component_id: "B".to_string(),
                unit_price_cents: Some(4500),
                available: true,
            },
        ]
    }

    #[test]
    fn test_percent_end_to_end() {
        let def = definition(BundleStatus::Active, DiscountPolicy::percent(Rate::from_percent(20)));
        let alloc = allocate_definition(&def, &quotes(), 3).unwrap();

        assert_eq!(alloc.subtotal.cents(), 22500);
        assert_eq!(alloc.discount.cents(), 4500);
        assert!(alloc.drift.is_zero());
        assert_eq!(alloc.lines[0].subtotal.cents(), 9000);
        assert_eq!(alloc.lines[0].adjustment.cents(), -1800);
        assert_eq!(alloc.lines[0].quantity, 3);
        assert_eq!(alloc.lines[0].effective_unit_price.cents(), 2400);
        assert_eq!(alloc.lines[1].adjustment.cents(), -2700);
        assert_eq!(alloc.lines[1].effective_unit_price.cents(), 3600);
        assert_eq!(alloc.lines[1].discount_rate, Rate::from_percent(20));
        assert_eq!(alloc.adjustment_total(), -alloc.discount);
    }

    #[test]
    fn test_fixed_price_rounding() {
        let alloc = allocate(
            "b",
            &DiscountPolicy::fixed(Money::from_cents(5000)),
            &components(&[3000, 2501]),
            1,
        )
        .unwrap();

        assert_eq!(alloc.discount.cents(), 501);
        assert_eq!(alloc.lines[0].adjustment.cents(), -273);
        assert_eq!(alloc.lines[1].adjustment.cents(), -228);
        assert_eq!(alloc.lines[0].discount_rate.bps(), 910);
        assert_eq!(alloc.lines[0].net().cents() + alloc.lines[1].net().cents(), 5000);
    }

    #[test]
    fn test_drift_lands_on_largest_line() {
        // 10% of 5, 5, 10 cents: raw -1, -1, -1 against D = 2
        let alloc = allocate(
            "b",
            &DiscountPolicy::percent(Rate::from_percent(10)),
            &components(&[5, 5, 10]),
            1,
        )
        .unwrap();

        assert_eq!(alloc.drift.cents(), 1);
        assert_eq!(alloc.lines[2].adjustment.cents(), 0);
        assert_eq!(alloc.adjustment_total().cents(), -2);
    }

    #[test]
    fn test_drift_tie_uses_display_order() {
        let mut comps = components(&[5, 5]);
        comps[0].display_order = 9;
        comps[1].display_order = 4;
        // 30% of 5 cents = 1.5 → 2 each, D = 30% of 10 = 3
        let policy = DiscountPolicy::percent(Rate::from_percent(30));
        let alloc = allocate("b", &policy, &comps, 1).unwrap();

        assert_eq!(alloc.drift.cents(), 1);
        assert_eq!(alloc.lines[0].adjustment.cents(), -2);
        assert_eq!(alloc.lines[1].adjustment.cents(), -1);
    }

    fn within_line(line: &AllocatedLine) -> bool {
        !line.adjustment.is_positive() && line.net() >= Money::zero()
    }

    #[test]
    fn test_reconciles_across_many_vectors() {
        let price_sets: [&[i64]; 5] = [
            &[1, 1, 1],
            &[333, 333, 334],
            &[999, 1, 7, 13],
            &[5001, 2499],
            &[17, 29, 31, 37, 41],
        ];
        for prices in price_sets {
            for multiplier in [1, 2, 3, 7] {
                for rate in [1, 333, 1250, 3333, 5000, 9999] {
                    let policy = DiscountPolicy::percent(Rate::from_bps(rate));
                    let alloc = allocate("b", &policy, &components(prices), multiplier).unwrap();
                    assert_eq!(alloc.adjustment_total(), -alloc.discount);
                    assert!(alloc.lines.iter().all(within_line));
                }
                let subtotal: i64 = prices.iter().sum::<i64>() * multiplier;
                for fixed in [0, 1, subtotal / 3, subtotal - 1] {
                    let policy = DiscountPolicy::fixed(Money::from_cents(fixed));
                    let alloc = allocate("b", &policy, &components(prices), 1).unwrap();
                    assert_eq!(alloc.adjustment_total(), -alloc.discount);
                    assert!(alloc.lines.iter().all(within_line));
                }
            }
        }
    }

    #[test]
    fn test_half_rate_on_cent_lines_reconciles() {
        let policy = DiscountPolicy::percent(Rate::from_percent(50));
        let alloc = allocate("b", &policy, &components(&[1, 1, 1, 1]), 1).unwrap();

        assert_eq!(alloc.discount.cents(), 2);
        assert_eq!(alloc.drift.cents(), 2);
        let adjustments: Vec<i64> = alloc.lines.iter().map(|l| l.adjustment.cents()).collect();
        assert_eq!(adjustments, vec![0, 0, -1, -1]);
    }

    #[test]
    fn test_zero_weights_are_a_validation_error() {
        let mut comps = components(&[300, 200]);
        for c in &mut comps {
            c.weight = Some(0);
        }
        let policy = DiscountPolicy::fixed(Money::from_cents(100));
        let err = allocate("b", &policy, &comps, 1).unwrap_err();
        assert!(matches!(err, PricingError::Validation(_)));
        assert!(err.is_user_visible());
    }

    #[test]
    fn test_deterministic() {
        let policy = DiscountPolicy::fixed(Money::from_cents(1000));
        let comps = components(&[333, 333, 334, 777]);
        let first = allocate("b", &policy, &comps, 2).unwrap();
        let second = allocate("b", &policy, &comps, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_fixed_no_markup() {
        let alloc = allocate(
            "b",
            &DiscountPolicy::fixed(Money::from_cents(10_000)),
            &components(&[3000, 2501]),
            1,
        )
        .unwrap();
        assert!(alloc.discount.is_zero());
        assert!(alloc.lines.iter().all(|l| l.adjustment.is_zero()));
        assert_eq!(alloc.lines[1].effective_unit_price.cents(), 2501);
    }

    #[test]
    fn test_inactive_definition_rejected() {
        let def = definition(BundleStatus::Broken, DiscountPolicy::percent(Rate::from_percent(20)));
        let err = allocate_definition(&def, &quotes(), 1).unwrap_err();
        assert!(matches!(err, PricingError::BundleNotActive { .. }));
    }

    #[test]
    fn test_empty_bundle_rejected() {
        let policy = DiscountPolicy::percent(Rate::from_percent(20));
        let err = allocate("b", &policy, &[], 1).unwrap_err();
        assert!(matches!(err, PricingError::EmptyBundle { .. }));
    }

    #[test]
    fn test_unavailable_component_rejected() {
        let def = definition(BundleStatus::Active, DiscountPolicy::percent(Rate::from_percent(20)));
        let mut q = quotes();
        q[1].available = false;
        let err = allocate_definition(&def, &q, 1).unwrap_err();
        assert!(matches!(
            err,
            PricingError::ComponentUnavailable { component_id } if component_id == "B"
        ));
    }
}
