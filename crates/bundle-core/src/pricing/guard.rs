//! # Promotion Guard
//!
//! Decides whether a non-bundle promotion may stack on a bundle line, and
//! how much of it survives the cumulative cap.
//!
//! ## Precedence Table
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬──────────┬─────────────┐
//! │ promotion    │ bundle       │ global       │ result   │ decided by  │
//! ├──────────────┼──────────────┼──────────────┼──────────┼─────────────┤
//! │ Never        │ *            │ *            │ deny     │ promotion   │
//! │ Always       │ *            │ *            │ allow    │ promotion   │
//! │ Inherit      │ No           │ *            │ deny     │ bundle      │
//! │ Inherit      │ Yes          │ *            │ allow    │ bundle      │
//! │ Inherit      │ Inherit      │ Exclude      │ deny     │ global      │
//! │ Inherit      │ Inherit      │ Allow        │ allow    │ global      │
//! └──────────────┴──────────────┴──────────────┴──────────┴─────────────┘
//! ```
//! Lines without a bundle key never reach the table.
//!
//! An allowed promotion becomes a separate adjustment on the line. The
//! bundle's own discount record is never modified.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{BundleOverride, GlobalStackingPolicy, PromotionOverride, Rate, StackingDefault};

/// Which level of the override chain produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    Promotion,
    Bundle,
    Global,
}

/// Outcome of the override chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackingVerdict {
    /// The line has no bundle key; the guard is not involved.
    NotBundled,
    Allow(DecidedBy),
    Deny(DecidedBy),
}

impl StackingVerdict {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, StackingVerdict::Deny(_))
    }
}

/// Resolves the three-level override chain for one line.
pub fn resolve_stacking(
    global: StackingDefault,
    promotion: PromotionOverride,
    bundle: BundleOverride,
    has_bundle_key: bool,
) -> StackingVerdict {
    if !has_bundle_key {
        return StackingVerdict::NotBundled;
    }

    match (promotion, bundle, global) {
        (PromotionOverride::Never, _, _) => StackingVerdict::Deny(DecidedBy::Promotion),
        (PromotionOverride::Always, _, _) => StackingVerdict::Allow(DecidedBy::Promotion),
        (PromotionOverride::Inherit, BundleOverride::No, _) => {
            StackingVerdict::Deny(DecidedBy::Bundle)
        }
        (PromotionOverride::Inherit, BundleOverride::Yes, _) => {
            StackingVerdict::Allow(DecidedBy::Bundle)
        }
        (PromotionOverride::Inherit, BundleOverride::Inherit, StackingDefault::Exclude) => {
            StackingVerdict::Deny(DecidedBy::Global)
        }
        (PromotionOverride::Inherit, BundleOverride::Inherit, StackingDefault::Allow) => {
            StackingVerdict::Allow(DecidedBy::Global)
        }
    }
}

/// Returns the part of `requested` that fits under `cap` given the rates
/// already on the line. Without a cap the full request is granted.
pub fn clamp_to_cap(
    bundle_rate: Rate,
    already_stacked: Rate,
    requested: Rate,
    cap: Option<Rate>,
) -> Rate {
    match cap {
        None => requested,
        Some(cap) => {
            let used = (bundle_rate + already_stacked).bps();
            let headroom = cap.bps().saturating_sub(used);
            Rate::from_bps(requested.bps().min(headroom))
        }
    }
}

/// Discount rates currently on the line being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineRates {
    pub has_bundle_key: bool,
    /// The bundle's own discount rate on the line.
    pub bundle_rate: Rate,
    /// Sum of promotion rates already stacked on the line.
    pub stacked_rate: Rate,
}

/// Final decision for one candidate promotion on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StackingDecision {
    /// Not a bundle line; the promotion applies normally.
    NotBundled { granted: Rate },
    Blocked { decided_by: DecidedBy },
    Applied { granted: Rate },
    /// The cap cut the contribution; the order is not rejected.
    Clamped { requested: Rate, granted: Rate },
}

impl StackingDecision {
    /// Rate that should be recorded as an adjustment, if any.
    pub fn granted(&self) -> Option<Rate> {
        match *self {
            StackingDecision::NotBundled { granted }
            | StackingDecision::Applied { granted }
            | StackingDecision::Clamped { granted, .. } => Some(granted),
            StackingDecision::Blocked { .. } => None,
        }
    }
}

/// Runs the guard for one candidate promotion on one line.
pub fn evaluate(
    policy: &GlobalStackingPolicy,
    promotion: PromotionOverride,
    bundle: BundleOverride,
    line: LineRates,
    requested: Rate,
) -> StackingDecision {
    match resolve_stacking(policy.default, promotion, bundle, line.has_bundle_key) {
        StackingVerdict::NotBundled => StackingDecision::NotBundled { granted: requested },
        StackingVerdict::Deny(decided_by) => StackingDecision::Blocked { decided_by },
        StackingVerdict::Allow(_) => {
            let granted = clamp_to_cap(line.bundle_rate, line.stacked_rate, requested, policy.cap);
            if granted == requested {
                StackingDecision::Applied { granted }
            } else {
                StackingDecision::Clamped { requested, granted }
            }
        }
    }
}

/// Money amount of a stacked promotion on a line, same rounding as the
/// bundle discount.
pub fn stacked_amount(line_subtotal: Money, granted: Rate) -> Money {
    line_subtotal.percent(granted)
}
