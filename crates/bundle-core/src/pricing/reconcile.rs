//! # Rounding Reconciler
//!
//! Independently rounded adjustments can miss `-D` by up to `n - 1` cents.
//! The difference (drift) goes to the line with the largest subtotal; ties
//! go to the lowest display order.
//!
//! ```text
//! drift = (-D) - Σ adj_i
//! adj_k += drift        where k = argmax S_i (lowest display order on ties)
//! ```
//!
//! A line never leaves `[-S_k, 0]`. When the first line cannot take all of
//! the drift, the rest spills to the next line in the same order. Since
//! `0 <= D <= S` the lines always have room for it.
//!
//! After correction `Σ adj_i == -D` must hold exactly. [`verify`] checks it
//! and reports a `ReconciliationViolation` otherwise.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{PricingError, PricingResult};
use crate::money::Money;

use super::aggregate::LineSubtotal;

/// Reconciled adjustments plus the correction that was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub adjustments: Vec<Money>,
    pub drift: Money,
    /// Index of the line that absorbed the drift, if any.
    pub corrected_line: Option<usize>,
}

/// Order in which lines absorb drift: largest subtotal, then lowest
/// display order, then position.
pub fn drift_order(lines: &[LineSubtotal]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..lines.len()).collect();
    order.sort_by(|&ia, &ib| {
        let (a, b) = (&lines[ia], &lines[ib]);
        b.subtotal
            .cmp(&a.subtotal)
            .then(a.display_order.cmp(&b.display_order))
            .then(ia.cmp(&ib))
    });
    order
}

/// Picks the line that absorbs drift first.
pub fn drift_target(lines: &[LineSubtotal]) -> Option<usize> {
    drift_order(lines).first().copied()
}

/// Corrects rounding drift so the adjustments sum to `-total`.
pub fn reconcile(
    total: Money,
    lines: &[LineSubtotal],
    mut adjustments: Vec<Money>,
) -> Reconciliation {
    let sum: Money = adjustments.iter().sum();
    let drift = -total - sum;

    if drift.is_zero() {
        return Reconciliation {
            adjustments,
            drift,
            corrected_line: None,
        };
    }

    let corrected_line = drift_target(lines);
    let mut remaining = drift.cents();

    for k in drift_order(lines) {
        if remaining == 0 {
            break;
        }
        let adjustment = adjustments[k].cents();
        // Positive drift moves toward 0, negative drift toward -S_k
        let room = if remaining > 0 {
            -adjustment
        } else {
            -(line_floor(&lines[k]) - adjustment)
        };
        let step = remaining.signum() * remaining.abs().min(room.max(0));
        adjustments[k] += Money::from_cents(step);
        remaining -= step;
    }

    Reconciliation {
        adjustments,
        drift,
        corrected_line,
    }
}

fn line_floor(line: &LineSubtotal) -> i64 {
    -line.subtotal.cents()
}

/// Checks the reconciliation postcondition.
///
/// - `Σ adj_i == -D`
/// - every line satisfies `-S_i <= adj_i <= 0`
///
/// Failures are logged at error level with the offending values.
pub fn verify(
    bundle_id: &str,
    total: Money,
    lines: &[LineSubtotal],
    adjustments: &[Money],
) -> PricingResult<()> {
    let sum: Money = adjustments.iter().sum();
    let expected = -total;

    if sum != expected || adjustments.len() != lines.len() {
        error!(
            bundle_id = %bundle_id,
            expected_cents = expected.cents(),
            actual_cents = sum.cents(),
            lines = lines.len(),
            adjustments = ?adjustments,
            "Bundle adjustments do not reconcile to the bundle discount"
        );
        return Err(PricingError::ReconciliationViolation {
            bundle_id: bundle_id.to_string(),
            expected_cents: expected.cents(),
            actual_cents: sum.cents(),
        });
    }

    for (line, adjustment) in lines.iter().zip(adjustments) {
        if adjustment.is_positive() || -*adjustment > line.subtotal {
            error!(
                bundle_id = %bundle_id,
                component_id = %line.component_id,
                subtotal_cents = line.subtotal.cents(),
                adjustment_cents = adjustment.cents(),
                "Bundle adjustment outside line bounds"
            );
            return Err(PricingError::ReconciliationViolation {
                bundle_id: bundle_id.to_string(),
                expected_cents: -line.subtotal.cents(),
                actual_cents: adjustment.cents(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, subtotal: i64, order: i32) -> LineSubtotal {
        LineSubtotal {
            component_id: id.to_string(),
            display_order: order,
            unit_price: Money::from_cents(subtotal),
            units: 1,
            weight: 1,
            subtotal: Money::from_cents(subtotal),
        }
    }

    fn cents(values: &[i64]) -> Vec<Money> {
        values.iter().copied().map(Money::from_cents).collect()
    }

    #[test]
    fn test_no_drift_leaves_adjustments_untouched() {
        let lines = [line("A", 9000, 0), line("B", 13500, 1)];
        let rec = reconcile(Money::from_cents(4500), &lines, cents(&[-1800, -2700]));
        assert!(rec.drift.is_zero());
        assert_eq!(rec.corrected_line, None);
        assert_eq!(rec.adjustments, cents(&[-1800, -2700]));
    }

    #[test]
    fn test_drift_goes_to_largest_line() {
        // Three $0.05 lines at 10%: each rounds 0.5 → 1, sum 3 vs D = round(1.5) = 2
        let lines = [line("A", 5, 0), line("B", 5, 1), line("C", 10, 2)];
        let rec = reconcile(Money::from_cents(2), &lines, cents(&[-1, -1, -1]));
        assert_eq!(rec.drift.cents(), 1);
        assert_eq!(rec.corrected_line, Some(2));
        assert_eq!(rec.adjustments, cents(&[-1, -1, 0]));
        assert!(verify("b", Money::from_cents(2), &lines, &rec.adjustments).is_ok());
    }

    #[test]
    fn test_tie_goes_to_lowest_display_order() {
        let lines = [line("A", 5, 7), line("B", 5, 3)];
        assert_eq!(drift_target(&lines), Some(1));

        let rec = reconcile(Money::from_cents(3), &lines, cents(&[-1, -1]));
        assert_eq!(rec.adjustments, cents(&[-1, -2]));
    }

    #[test]
    fn test_drift_spills_when_first_line_hits_zero() {
        // 50% of four 1-cent lines: each rounds to -1, D = 2
        let lines = [line("A", 1, 0), line("B", 1, 1), line("C", 1, 2), line("D", 1, 3)];
        let rec = reconcile(Money::from_cents(2), &lines, cents(&[-1, -1, -1, -1]));
        assert_eq!(rec.drift.cents(), 2);
        assert_eq!(rec.corrected_line, Some(0));
        assert_eq!(rec.adjustments, cents(&[0, 0, -1, -1]));
        assert!(verify("b", Money::from_cents(2), &lines, &rec.adjustments).is_ok());
    }

    #[test]
    fn test_negative_drift_spills_at_line_subtotal() {
        let lines = [line("A", 3, 0), line("B", 2, 1)];
        let rec = reconcile(Money::from_cents(5), &lines, cents(&[-2, -1]));
        assert_eq!(rec.drift.cents(), -2);
        assert_eq!(rec.adjustments, cents(&[-3, -2]));
        assert!(verify("b", Money::from_cents(5), &lines, &rec.adjustments).is_ok());
    }

    #[test]
    fn test_drift_order() {
        let lines = [line("A", 5, 7), line("B", 9, 8), line("C", 5, 3)];
        assert_eq!(drift_order(&lines), vec![1, 2, 0]);
        assert_eq!(drift_target(&[]), None);
    }

    #[test]
    fn test_verify_rejects_mismatch() {
        let lines = [line("A", 3000, 0), line("B", 2501, 1)];
        let err = verify("b-7", Money::from_cents(501), &lines, &cents(&[-273, -227])).unwrap_err();
        assert!(matches!(
            err,
            PricingError::ReconciliationViolation { expected_cents: -501, actual_cents: -500, .. }
        ));
    }

    #[test]
    fn test_verify_rejects_out_of_bounds_line() {
        let lines = [line("A", 100, 0), line("B", 1000, 1)];
        let err = verify("b", Money::from_cents(300), &lines, &cents(&[-400, 100])).unwrap_err();
        assert!(matches!(err, PricingError::ReconciliationViolation { .. }));
    }
}
