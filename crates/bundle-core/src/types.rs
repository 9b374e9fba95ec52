//! # Domain Types
//!
//! Core domain types shared by the allocator and the persistence layer.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │ BundleDefinition │   │   BundleItem     │   │   Component      │    │
//! │  │ ───────────────  │   │ ───────────────  │   │ ───────────────  │    │
//! │  │ policy           │──►│ component_id     │──►│ unit_price_cents │    │
//! │  │ status, version  │   │ quantity, weight │   │ is_available     │    │
//! │  │ stacking         │   │ display_order    │   └──────────────────┘    │
//! │  └──────────────────┘   └──────────────────┘                            │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │ OrderLineSnapshot│   │ LineAdjustment   │   │   Promotion      │    │
//! │  │ ───────────────  │   │ ───────────────  │   │ ───────────────  │    │
//! │  │ bundle_key       │◄──│ order_line_id    │◄──│ rate_bps         │    │
//! │  │ base/effective   │   │ amount_cents     │   │ stacking         │    │
//! │  │ discount_cents   │   │ (stacked promo)  │   └──────────────────┘    │
//! │  └──────────────────┘   └──────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The bundle's own discount lives in the order line's `discount_*` columns.
//! Stacked promotions are separate `LineAdjustment` rows and never touch them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Rate
// =============================================================================

/// A percentage in basis points (1 bp = 0.01%, 10000 bp = 100%).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// 100% in basis points.
    pub const FULL_BPS: u32 = 10_000;

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a whole percentage (20 → 20%).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        Rate(pct * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The complement `100% - self`, floored at zero.
    #[inline]
    pub const fn complement(&self) -> Rate {
        Rate(Self::FULL_BPS.saturating_sub(self.0))
    }

    /// Returns the rate as a percentage (display only).
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl std::ops::Add for Rate {
    type Output = Rate;

    fn add(self, other: Rate) -> Rate {
        Rate(self.0.saturating_add(other.0))
    }
}

// =============================================================================
// Discount Policy
// =============================================================================

/// How a bundle discounts its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscountPolicy {
    /// Percent off every component (`rate_bps` in 0..=10000).
    Percent { rate_bps: u32 },
    /// Fixed total price for one bundle, in cents.
    Fixed { amount_cents: i64 },
}

impl DiscountPolicy {
    pub const KIND_PERCENT: &'static str = "percent";
    pub const KIND_FIXED: &'static str = "fixed";

    pub fn percent(rate: Rate) -> Self {
        DiscountPolicy::Percent { rate_bps: rate.bps() }
    }

    pub fn fixed(amount: Money) -> Self {
        DiscountPolicy::Fixed {
            amount_cents: amount.cents(),
        }
    }

    /// Checks the policy invariants: rate within 0-100%, fixed amount >= 0.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            DiscountPolicy::Percent { rate_bps } if rate_bps > Rate::FULL_BPS => {
                Err(ValidationError::OutOfRange {
                    field: "discount rate".to_string(),
                    min: 0,
                    max: Rate::FULL_BPS as i64,
                })
            }
            DiscountPolicy::Fixed { amount_cents } if amount_cents < 0 => {
                Err(ValidationError::OutOfRange {
                    field: "fixed price".to_string(),
                    min: 0,
                    max: i64::MAX,
                })
            }
            _ => Ok(()),
        }
    }

    /// Splits the policy into the `(kind, value)` pair stored in SQLite.
    pub fn to_parts(&self) -> (&'static str, i64) {
        match *self {
            DiscountPolicy::Percent { rate_bps } => (Self::KIND_PERCENT, rate_bps as i64),
            DiscountPolicy::Fixed { amount_cents } => (Self::KIND_FIXED, amount_cents),
        }
    }

    /// Rebuilds a policy from its stored `(kind, value)` pair.
    pub fn from_parts(kind: &str, value: i64) -> Result<Self, ValidationError> {
        let policy = match kind {
            Self::KIND_PERCENT => {
                let rate_bps = u32::try_from(value).map_err(|_| ValidationError::OutOfRange {
                    field: "discount rate".to_string(),
                    min: 0,
                    max: Rate::FULL_BPS as i64,
                })?;
                DiscountPolicy::Percent { rate_bps }
            }
            Self::KIND_FIXED => DiscountPolicy::Fixed { amount_cents: value },
            _ => {
                return Err(ValidationError::NotAllowed {
                    field: "policy kind".to_string(),
                    allowed: vec![Self::KIND_PERCENT.to_string(), Self::KIND_FIXED.to_string()],
                })
            }
        };
        policy.validate()?;
        Ok(policy)
    }
}

// =============================================================================
// Bundle Status
// =============================================================================

/// Lifecycle status of a bundle definition. See [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    /// Being edited; not sellable.
    #[default]
    Draft,
    /// Published and sellable.
    Active,
    /// A referenced component became unavailable.
    Broken,
    /// Retired by an operator.
    Archived,
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleStatus::Draft => write!(f, "draft"),
            BundleStatus::Active => write!(f, "active"),
            BundleStatus::Broken => write!(f, "broken"),
            BundleStatus::Archived => write!(f, "archived"),
        }
    }
}

// =============================================================================
// Promotion Stacking Policy
// =============================================================================

/// Store-wide default for promotions on bundle lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StackingDefault {
    #[default]
    Exclude,
    Allow,
}

impl std::str::FromStr for StackingDefault {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exclude" | "deny" => Ok(StackingDefault::Exclude),
            "allow" => Ok(StackingDefault::Allow),
            _ => Err(ValidationError::NotAllowed {
                field: "stacking default".to_string(),
                allowed: vec!["exclude".to_string(), "allow".to_string()],
            }),
        }
    }
}

/// Per-promotion override of the stacking default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PromotionOverride {
    #[default]
    Inherit,
    Never,
    Always,
}

/// Per-bundle override of the stacking default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BundleOverride {
    #[default]
    Inherit,
    No,
    Yes,
}

/// Global stacking policy: default plus an optional cumulative cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GlobalStackingPolicy {
    pub default: StackingDefault,
    /// Cap on the sum of all discount rates on one bundle line.
    pub cap: Option<Rate>,
}

// =============================================================================
// Catalog Types
// =============================================================================

/// A sellable unit that bundles are built from.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Component {
    pub id: String,
    pub sku: String,
    pub name: String,
    /// Current unit price. `None` means the component has no price yet.
    pub unit_price_cents: Option<i64>,
    pub is_available: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Component {
    /// The pricing-lookup answer for this component.
    pub fn quote(&self) -> ComponentQuote {
        ComponentQuote {
            component_id: self.id.clone(),
            unit_price_cents: self.unit_price_cents,
            available: self.is_available,
        }
    }
}

/// Answer of the component-pricing lookup: current price and availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComponentQuote {
    pub component_id: String,
    pub unit_price_cents: Option<i64>,
    pub available: bool,
}

/// One component slot in a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BundleItem {
    pub id: String,
    pub bundle_id: String,
    pub component_id: String,
    /// Units of the component per bundle (>= 1).
    pub quantity: i64,
    /// Optional proration weight, used only by the fixed policy.
    pub weight: Option<u32>,
    pub display_order: i32,
}

/// A named, priced grouping of components sold as a set.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BundleDefinition {
    pub id: String,
    pub name: String,
    pub policy: DiscountPolicy,
    pub status: BundleStatus,
    /// Incremented on every publish.
    pub version: i64,
    pub stacking: BundleOverride,
    /// Ordered by `display_order`.
    pub items: Vec<BundleItem>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A non-bundle promotion that may stack on bundle lines.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Promotion {
    pub id: String,
    pub name: String,
    pub rate_bps: u32,
    pub stacking: PromotionOverride,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Promotion {
    #[inline]
    pub fn rate(&self) -> Rate {
        Rate::from_bps(self.rate_bps)
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Order status. Bundle mutations are only allowed on open orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Open,
    Placed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Order Line Snapshot
// =============================================================================

/// A priced order line belonging to one bundle instance.
///
/// Uses the snapshot pattern: the unit price is frozen when the line is
/// created and later quantity adjustments reuse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderLineSnapshot {
    pub id: String,
    pub order_id: String,
    /// Shared by every line of one bundle instance in one order.
    pub bundle_key: String,
    pub bundle_id: String,
    /// `None` for the cosmetic header line.
    pub component_id: Option<String>,
    pub is_header: bool,
    pub display_order: i32,
    pub quantity: i64,
    pub base_unit_price_cents: i64,
    pub effective_unit_price_cents: i64,
    /// Bundle discount on this line (positive cents; the adjustment is its negation).
    pub discount_cents: i64,
    pub discount_bps: u32,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl OrderLineSnapshot {
    /// Pre-discount line subtotal (base unit price × quantity).
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.base_unit_price_cents) * self.quantity
    }

    /// The bundle's own adjustment on this line (<= 0).
    pub fn adjustment(&self) -> Money {
        -Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn discount_rate(&self) -> Rate {
        Rate::from_bps(self.discount_bps)
    }
}

/// A stacked promotion adjustment recorded next to (not inside) the
/// bundle's own discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LineAdjustment {
    pub id: String,
    pub order_line_id: String,
    pub promotion_id: String,
    /// Rate actually granted after cap clamping.
    pub rate_bps: u32,
    /// Discount amount (positive cents).
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
