//! # Bundle Lifecycle
//!
//! ```text
//!              publish                 component unavailable
//!   ┌───────┐ ────────► ┌────────┐ ──────────────────────► ┌────────┐
//!   │ Draft │           │ Active │                         │ Broken │
//!   └───┬───┘           └───┬────┘ ◄────────────────────── └───┬────┘
//!       │                   │           re-publish             │
//!       │ archive           │ archive                  archive │
//!       ▼                   ▼                                  ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                          Archived                            │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only `Active` bundles can be added to an order. Archived is terminal.

use chrono::Utc;
use tracing::info;

use crate::error::{PricingError, PricingResult};
use crate::pricing::aggregate::price_components;
use crate::types::{BundleDefinition, BundleStatus, ComponentQuote};
use crate::validation::{validate_item_quantity, validate_name, validate_weight};

impl BundleStatus {
    /// Returns true if the lifecycle allows moving from `self` to `to`.
    pub fn can_transition_to(&self, to: BundleStatus) -> bool {
        use BundleStatus::*;

        matches!(
            (self, to),
            (Draft, Active)
                | (Active, Broken)
                | (Active, Archived)
                | (Broken, Active)
                | (Draft, Archived)
                | (Broken, Archived)
        )
    }

    /// Items may only be edited while the bundle is not sellable.
    pub fn is_editable(&self) -> bool {
        matches!(self, BundleStatus::Draft | BundleStatus::Broken)
    }
}

fn transition(definition: &mut BundleDefinition, to: BundleStatus) -> PricingResult<()> {
    if !definition.status.can_transition_to(to) {
        return Err(PricingError::InvalidTransition {
            bundle_id: definition.id.clone(),
            from: definition.status,
            to,
        });
    }

    info!(
        bundle_id = %definition.id,
        from = %definition.status,
        to = %to,
        "Bundle status changed"
    );
    definition.status = to;
    definition.updated_at = Utc::now();
    Ok(())
}

/// Checks the definition is complete and every component can be priced.
pub fn validate_definition(
    definition: &BundleDefinition,
    quotes: &[ComponentQuote],
) -> PricingResult<()> {
    validate_name("bundle name", &definition.name)?;
    definition.policy.validate()?;

    if definition.items.is_empty() {
        return Err(PricingError::EmptyBundle {
            bundle_id: definition.id.clone(),
        });
    }

    for item in &definition.items {
        validate_item_quantity(item.quantity)?;
        validate_weight(item.weight)?;
    }

    price_components(&definition.items, quotes)?;
    Ok(())
}

/// Publishes a Draft or Broken bundle, bumping its version.
pub fn publish(definition: &mut BundleDefinition, quotes: &[ComponentQuote]) -> PricingResult<()> {
    validate_definition(definition, quotes)?;
    transition(definition, BundleStatus::Active)?;
    definition.version += 1;
    Ok(())
}

/// Marks an Active bundle as Broken after a component became unavailable.
pub fn mark_broken(definition: &mut BundleDefinition) -> PricingResult<()> {
    transition(definition, BundleStatus::Broken)
}

pub fn archive(definition: &mut BundleDefinition) -> PricingResult<()> {
    transition(definition, BundleStatus::Archived)
}

/// Fails unless the bundle can be added to an order right now.
pub fn ensure_sellable(definition: &BundleDefinition) -> PricingResult<()> {
    if definition.status != BundleStatus::Active {
        return Err(PricingError::BundleNotActive {
            bundle_id: definition.id.clone(),
            status: definition.status,
        });
    }
    if definition.items.is_empty() {
        return Err(PricingError::EmptyBundle {
            bundle_id: definition.id.clone(),
        });
    }
    Ok(())
}
