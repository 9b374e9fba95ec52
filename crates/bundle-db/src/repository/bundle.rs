//! # Bundle Repository
//!
//! Bundle definitions and their component items.
//!
//! ## Lifecycle in the Database
//! ```text
//! create_draft() ──► add_item()/remove_item() ──► publish() ──► Active
//!                         ▲                                       │
//!                         │           component unavailable       │
//!                         └──────────────── Broken ◄──────────────┘
//! archive() from Draft, Active or Broken
//! ```
//!
//! Status rules live in `bundle_core::lifecycle`; this module loads a
//! definition, applies the rule, and writes the result back.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::component::fetch_quotes;
use crate::error::{DbError, DbResult};
use bundle_core::lifecycle;
use bundle_core::validation::{
    validate_bundle_size, validate_item_quantity, validate_name, validate_weight,
};
use bundle_core::{
    BundleDefinition, BundleItem, BundleOverride, BundleStatus, DiscountPolicy, ValidationError,
};

/// Row shape of the `bundles` table. The policy is stored as two columns.
#[derive(sqlx::FromRow)]
struct BundleRow {
    id: String,
    name: String,
    policy_kind: String,
    policy_value: i64,
    status: BundleStatus,
    version: i64,
    stacking: BundleOverride,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BundleRow {
    fn into_definition(self, items: Vec<BundleItem>) -> DbResult<BundleDefinition> {
        let policy = DiscountPolicy::from_parts(&self.policy_kind, self.policy_value)?;
        Ok(BundleDefinition {
            id: self.id,
            name: self.name,
            policy,
            status: self.status,
            version: self.version,
            stacking: self.stacking,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for bundle definitions.
#[derive(Debug, Clone)]
pub struct BundleRepository {
    pool: SqlitePool,
}

impl BundleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BundleRepository { pool }
    }

    /// Creates an empty Draft bundle.
    pub async fn create_draft(
        &self,
        name: &str,
        policy: DiscountPolicy,
        stacking: BundleOverride,
    ) -> DbResult<BundleDefinition> {
        validate_name("bundle name", name)?;
        policy.validate()?;

        let now = Utc::now();
        let definition = BundleDefinition {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            policy,
            status: BundleStatus::Draft,
            version: 0,
            stacking,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let (kind, value) = policy.to_parts();

        debug!(id = %definition.id, name = %definition.name, "Creating draft bundle");

        sqlx::query(
            r#"
            INSERT INTO bundles (
                id, name, policy_kind, policy_value, status, version, stacking,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&definition.id)
        .bind(&definition.name)
        .bind(kind)
        .bind(value)
        .bind(definition.status)
        .bind(definition.version)
        .bind(definition.stacking)
        .bind(definition.created_at)
        .bind(definition.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(definition)
    }

    /// Gets a bundle with its items ordered by display order.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<BundleDefinition>> {
        let mut conn = self.pool.acquire().await?;
        match fetch_definition(&mut conn, id).await {
            Ok(definition) => Ok(Some(definition)),
            Err(DbError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Adds a component to a Draft or Broken bundle.
    pub async fn add_item(
        &self,
        bundle_id: &str,
        component_id: &str,
        quantity: i64,
        weight: Option<u32>,
    ) -> DbResult<BundleItem> {
        validate_item_quantity(quantity)?;
        validate_weight(weight)?;

        let mut tx = self.pool.begin().await?;
        let definition = fetch_definition(&mut tx, bundle_id).await?;
        ensure_editable(&definition)?;
        validate_bundle_size(definition.items.len())?;

        let display_order = definition
            .items
            .iter()
            .map(|item| item.display_order + 1)
            .max()
            .unwrap_or(0);

        let item = BundleItem {
            id: Uuid::new_v4().to_string(),
            bundle_id: bundle_id.to_string(),
            component_id: component_id.to_string(),
            quantity,
            weight,
            display_order,
        };

        sqlx::query(
            r#"
            INSERT INTO bundle_items (id, bundle_id, component_id, quantity, weight, display_order)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&item.id)
        .bind(&item.bundle_id)
        .bind(&item.component_id)
        .bind(item.quantity)
        .bind(item.weight)
        .bind(item.display_order)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("bundle component", component_id),
            other => other,
        })?;

        touch(&mut tx, bundle_id).await?;
        tx.commit().await?;

        debug!(bundle_id = %bundle_id, component_id = %component_id, "Bundle item added");
        Ok(item)
    }

    /// Removes an item from a Draft or Broken bundle.
    pub async fn remove_item(&self, bundle_id: &str, item_id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let definition = fetch_definition(&mut tx, bundle_id).await?;
        ensure_editable(&definition)?;

        let result = sqlx::query("DELETE FROM bundle_items WHERE id = ?1 AND bundle_id = ?2")
            .bind(item_id)
            .bind(bundle_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Bundle item", item_id));
        }

        touch(&mut tx, bundle_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Publishes a Draft or Broken bundle against current component prices.
    pub async fn publish(&self, bundle_id: &str) -> DbResult<BundleDefinition> {
        let mut tx = self.pool.begin().await?;
        let mut definition = fetch_definition(&mut tx, bundle_id).await?;

        let component_ids: Vec<String> =
            definition.items.iter().map(|i| i.component_id.clone()).collect();
        let quotes = fetch_quotes(&mut tx, &component_ids).await?;

        lifecycle::publish(&mut definition, &quotes)?;
        write_status(&mut tx, &definition).await?;
        tx.commit().await?;

        info!(bundle_id = %bundle_id, version = definition.version, "Bundle published");
        Ok(definition)
    }

    pub async fn archive(&self, bundle_id: &str) -> DbResult<BundleDefinition> {
        let mut tx = self.pool.begin().await?;
        let mut definition = fetch_definition(&mut tx, bundle_id).await?;
        lifecycle::archive(&mut definition)?;
        write_status(&mut tx, &definition).await?;
        tx.commit().await?;
        Ok(definition)
    }

    /// Moves an Active bundle to Broken.
    pub async fn mark_broken(&self, bundle_id: &str) -> DbResult<BundleDefinition> {
        let mut tx = self.pool.begin().await?;
        let mut definition = fetch_definition(&mut tx, bundle_id).await?;
        lifecycle::mark_broken(&mut definition)?;
        write_status(&mut tx, &definition).await?;
        tx.commit().await?;
        Ok(definition)
    }

    /// Changes the bundle's stacking override.
    pub async fn set_stacking(&self, bundle_id: &str, stacking: BundleOverride) -> DbResult<()> {
        let result = sqlx::query("UPDATE bundles SET stacking = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(bundle_id)
            .bind(stacking)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Bundle", bundle_id));
        }
        Ok(())
    }
}

fn ensure_editable(definition: &BundleDefinition) -> DbResult<()> {
    if !definition.status.is_editable() {
        return Err(ValidationError::NotAllowed {
            field: format!("bundle status ({})", definition.status),
            allowed: vec![BundleStatus::Draft.to_string(), BundleStatus::Broken.to_string()],
        }
        .into());
    }
    Ok(())
}

async fn touch(conn: &mut SqliteConnection, bundle_id: &str) -> DbResult<()> {
    sqlx::query("UPDATE bundles SET updated_at = ?2 WHERE id = ?1")
        .bind(bundle_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn write_status(conn: &mut SqliteConnection, definition: &BundleDefinition) -> DbResult<()> {
    sqlx::query("UPDATE bundles SET status = ?2, version = ?3, updated_at = ?4 WHERE id = ?1")
        .bind(&definition.id)
        .bind(definition.status)
        .bind(definition.version)
        .bind(definition.updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Loads a bundle and its items on an existing connection or transaction.
pub(crate) async fn fetch_definition(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<BundleDefinition> {
    let row = sqlx::query_as::<_, BundleRow>(
        r#"
        SELECT id, name, policy_kind, policy_value, status, version, stacking,
               created_at, updated_at
        FROM bundles
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("Bundle", id))?;

    let items = sqlx::query_as::<_, BundleItem>(
        r#"
        SELECT id, bundle_id, component_id, quantity, weight, display_order
        FROM bundle_items
        WHERE bundle_id = ?1
        ORDER BY display_order, id
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    row.into_definition(items)
}
