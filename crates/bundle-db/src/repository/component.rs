//! # Component Repository
//!
//! Catalog components and the component-pricing lookup used by the
//! allocator.
//!
//! ## Availability
//! ```text
//! set_availability(id, false)
//!   └── UPDATE components            ┐
//!   └── Active bundles using it      │ one transaction
//!       → status = 'broken'          ┘
//! ```
//!
//! Deleting a component that any bundle references fails in SQLite
//! (`ON DELETE RESTRICT`) and surfaces as `DbError::ForeignKeyViolation`.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use bundle_core::validation::{validate_name, validate_price_cents, validate_sku};
use bundle_core::{Component, ComponentQuote};

const COMPONENT_COLUMNS: &str =
    "id, sku, name, unit_price_cents, is_available, created_at, updated_at";

/// Repository for catalog components.
#[derive(Debug, Clone)]
pub struct ComponentRepository {
    pool: SqlitePool,
}

impl ComponentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ComponentRepository { pool }
    }

    /// Creates a component. A `None` price is allowed; such a component can
    /// be put in a draft bundle but the bundle cannot be published.
    pub async fn create(
        &self,
        sku: &str,
        name: &str,
        unit_price_cents: Option<i64>,
    ) -> DbResult<Component> {
        validate_sku(sku)?;
        validate_name("component name", name)?;
        if let Some(cents) = unit_price_cents {
            validate_price_cents(cents)?;
        }

        let now = Utc::now();
        let component = Component {
            id: Uuid::new_v4().to_string(),
            sku: sku.trim().to_string(),
            name: name.trim().to_string(),
            unit_price_cents,
            is_available: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %component.id, sku = %component.sku, "Inserting component");

        sqlx::query(
            r#"
            INSERT INTO components (
                id, sku, name, unit_price_cents, is_available, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&component.id)
        .bind(&component.sku)
        .bind(&component.name)
        .bind(component.unit_price_cents)
        .bind(component.is_available)
        .bind(component.created_at)
        .bind(component.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => {
                DbError::duplicate(field, component.sku.clone())
            }
            other => other,
        })?;

        Ok(component)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Component>> {
        let component = sqlx::query_as::<_, Component>(&format!(
            "SELECT {} FROM components WHERE id = ?1",
            COMPONENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(component)
    }

    /// Changes the current unit price. Order lines already created keep the
    /// price they were snapshotted with.
    pub async fn set_price(&self, id: &str, unit_price_cents: Option<i64>) -> DbResult<()> {
        if let Some(cents) = unit_price_cents {
            validate_price_cents(cents)?;
        }

        let result = sqlx::query(
            "UPDATE components SET unit_price_cents = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(unit_price_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Component", id));
        }

        Ok(())
    }

    /// Marks a component available or unavailable.
    ///
    /// Going unavailable moves every Active bundle that uses the component to
    /// Broken in the same transaction. Returns the IDs of those bundles.
    pub async fn set_availability(&self, id: &str, available: bool) -> DbResult<Vec<String>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("UPDATE components SET is_available = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(id)
                .bind(available)
                .bind(now)
                .execute(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Component", id));
        }

        let mut broken = Vec::new();
        if !available {
            broken = sqlx::query_scalar::<_, String>(
                r#"
                SELECT DISTINCT b.id
                FROM bundles b
                JOIN bundle_items bi ON bi.bundle_id = b.id
                WHERE bi.component_id = ?1 AND b.status = 'active'
                ORDER BY b.id
                "#,
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

            for bundle_id in &broken {
                sqlx::query("UPDATE bundles SET status = 'broken', updated_at = ?2 WHERE id = ?1")
                    .bind(bundle_id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                warn!(
                    bundle_id = %bundle_id,
                    component_id = %id,
                    "Bundle broken by unavailable component"
                );
            }
        }

        tx.commit().await?;

        info!(
            component_id = %id,
            available,
            broken = broken.len(),
            "Component availability changed"
        );
        Ok(broken)
    }

    /// Deletes a component.
    ///
    /// ## Errors
    /// `ForeignKeyViolation` while any bundle or order line references it.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM components WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Component", id));
        }

        info!(component_id = %id, "Component deleted");
        Ok(())
    }

    /// Current price and availability for the given components.
    pub async fn quotes_for(&self, component_ids: &[String]) -> DbResult<Vec<ComponentQuote>> {
        let mut conn = self.pool.acquire().await?;
        fetch_quotes(&mut conn, component_ids).await
    }
}

/// Component-pricing lookup on an existing connection or transaction.
///
/// Components that don't exist are simply absent from the result; the
/// aggregator reports them as missing prices.
pub(crate) async fn fetch_quotes(
    conn: &mut SqliteConnection,
    component_ids: &[String],
) -> DbResult<Vec<ComponentQuote>> {
    if component_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM components WHERE id IN (", COMPONENT_COLUMNS));
    let mut separated = builder.separated(", ");
    for id in component_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let components = builder.build_query_as::<Component>().fetch_all(&mut *conn).await?;
    Ok(components.iter().map(Component::quote).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = db().await;
        let created = db.components().create("KB-01", "Keyboard", Some(3000)).await.unwrap();

        let fetched = db.components().get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.sku, "KB-01");
        assert_eq!(fetched.unit_price_cents, Some(3000));
        assert!(fetched.is_available);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = db().await;
        db.components().create("KB-01", "Keyboard", Some(3000)).await.unwrap();
        let err = db.components().create("KB-01", "Other", Some(100)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { value, .. } if value == "KB-01"));
    }

    #[tokio::test]
    async fn test_quotes_for() {
        let db = db().await;
        let a = db.components().create("A-1", "Mouse", Some(2501)).await.unwrap();
        let b = db.components().create("B-1", "Pad", None).await.unwrap();

        let quotes = db
            .components()
            .quotes_for(&[a.id.clone(), b.id.clone(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(quotes.len(), 2);
        let qb = quotes.iter().find(|q| q.component_id == b.id).unwrap();
        assert_eq!(qb.unit_price_cents, None);

        assert!(db.components().quotes_for(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_price_and_missing_component() {
        let db = db().await;
        let a = db.components().create("A-1", "Mouse", None).await.unwrap();
        db.components().set_price(&a.id, Some(999)).await.unwrap();
        let fetched = db.components().get_by_id(&a.id).await.unwrap().unwrap();
        assert_eq!(fetched.unit_price_cents, Some(999));

        let err = db.components().set_price("nope", Some(1)).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_unreferenced() {
        let db = db().await;
        let a = db.components().create("A-1", "Mouse", Some(100)).await.unwrap();
        db.components().delete(&a.id).await.unwrap();
        assert!(db.components().get_by_id(&a.id).await.unwrap().is_none());
    }
}
