//! # Order Repository
//!
//! Orders and read access to their bundle line snapshots. Bundle lines are
//! written only by [`crate::service::BundleOrderService`] so that every
//! write covers a whole bundle instance.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use bundle_core::{LineAdjustment, Order, OrderLineSnapshot, OrderStatus};

pub(crate) const LINE_COLUMNS: &str = r#"
    id, order_id, bundle_key, bundle_id, component_id, is_header, display_order,
    quantity, base_unit_price_cents, effective_unit_price_cents, discount_cents,
    discount_bps, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Creates an empty open order.
    pub async fn create(&self) -> DbResult<Order> {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            status: OrderStatus::Open,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO orders (id, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&order.id)
        .bind(order.status)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(order_id = %order.id, "Order created");
        Ok(order)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT id, status, created_at, updated_at FROM orders WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    /// Places an open order. Its bundle lines are frozen afterwards.
    pub async fn place(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET status = 'placed', updated_at = ?2
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order (open)", id));
        }

        info!(order_id = %id, "Order placed");
        Ok(())
    }

    /// Deletes an open order together with its lines and adjustments.
    pub async fn discard(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ?1 AND status = 'open'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order (open)", id));
        }
        Ok(())
    }

    /// All lines of an order: each bundle's header first, then its
    /// components in display order.
    pub async fn lines(&self, order_id: &str) -> DbResult<Vec<OrderLineSnapshot>> {
        let lines = sqlx::query_as::<_, OrderLineSnapshot>(&format!(
            r#"
            SELECT {}
            FROM order_lines
            WHERE order_id = ?1
            ORDER BY created_at, bundle_key, is_header DESC, display_order
            "#,
            LINE_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }

    /// Lines of one bundle instance, header first.
    pub async fn bundle_lines(
        &self,
        order_id: &str,
        bundle_key: &str,
    ) -> DbResult<Vec<OrderLineSnapshot>> {
        let mut conn = self.pool.acquire().await?;
        fetch_bundle_lines(&mut conn, order_id, bundle_key).await
    }

    /// Stacked promotion adjustments recorded on a line.
    pub async fn adjustments(&self, order_line_id: &str) -> DbResult<Vec<LineAdjustment>> {
        let adjustments = sqlx::query_as::<_, LineAdjustment>(
            r#"
            SELECT id, order_line_id, promotion_id, rate_bps, amount_cents, created_at
            FROM line_adjustments
            WHERE order_line_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(order_line_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(adjustments)
    }
}

pub(crate) async fn fetch_bundle_lines(
    conn: &mut SqliteConnection,
    order_id: &str,
    bundle_key: &str,
) -> DbResult<Vec<OrderLineSnapshot>> {
    let lines = sqlx::query_as::<_, OrderLineSnapshot>(&format!(
        r#"
        SELECT {}
        FROM order_lines
        WHERE order_id = ?1 AND bundle_key = ?2
        ORDER BY is_header DESC, display_order, id
        "#,
        LINE_COLUMNS
    ))
    .bind(order_id)
    .bind(bundle_key)
    .fetch_all(&mut *conn)
    .await?;
    Ok(lines)
}

/// Fails unless the order exists and is still open.
pub(crate) async fn ensure_open(conn: &mut SqliteConnection, order_id: &str) -> DbResult<()> {
    let status = sqlx::query_scalar::<_, OrderStatus>("SELECT status FROM orders WHERE id = ?1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;

    match status {
        Some(OrderStatus::Open) => Ok(()),
        _ => Err(DbError::not_found("Order (open)", order_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_order_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = db.orders().create().await.unwrap();

        let loaded = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrderStatus::Open);
        assert!(db.orders().lines(&order.id).await.unwrap().is_empty());

        db.orders().place(&order.id).await.unwrap();
        assert!(matches!(db.orders().place(&order.id).await, Err(DbError::NotFound { .. })));
        assert!(db.orders().discard(&order.id).await.is_err());
    }

    #[tokio::test]
    async fn test_discard_open_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = db.orders().create().await.unwrap();
        db.orders().discard(&order.id).await.unwrap();
        assert!(db.orders().get_by_id(&order.id).await.unwrap().is_none());
    }
}
