//! # Bundle Order Service
//!
//! Order mutations for bundles: add, adjust, remove, and the promotion
//! stacking hook.
//!
//! ## One Transaction per Mutation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_bundle(order, bundle, B)                                           │
//! │    BEGIN                                                                │
//! │    ├── order must be open                                               │
//! │    ├── load definition + current component quotes                       │
//! │    ├── allocate (aggregate → calculate → reconcile → verify)            │
//! │    ├── INSERT header line (cosmetic, zero price, policy snapshot)       │
//! │    └── INSERT one line per component (price snapshot, adjustment)       │
//! │    COMMIT  ← all lines of the bundle key, or none                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `adjust_bundle` reprices from the snapshots stored on the lines, never
//! from current catalog prices. Stacked promotions are separate
//! `line_adjustments` rows and never change the bundle's own discount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::bundle::fetch_definition;
use crate::repository::component::fetch_quotes;
use crate::repository::order::{ensure_open, fetch_bundle_lines, LINE_COLUMNS};
use bundle_core::pricing::{
    allocate, allocate_definition, clamp_to_cap, evaluate, stacked_amount, AllocatedLine,
    LineRates, PricedComponent, StackingDecision,
};
use bundle_core::validation::validate_bundle_quantity;
use bundle_core::{
    BundleOverride, DiscountPolicy, GlobalStackingPolicy, Money, OrderLineSnapshot, PricingError,
    Promotion, Rate, ValidationError,
};

/// Result of [`BundleOrderService::add_bundle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedBundle {
    pub bundle_key: String,
    pub header: OrderLineSnapshot,
    pub children: Vec<OrderLineSnapshot>,
    /// Bundle discount `D` across all children.
    pub discount: Money,
}

/// Snapshot columns that only the service reads back.
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    bundle_id: String,
    component_id: Option<String>,
    is_header: bool,
    display_order: i32,
    base_unit_price_cents: i64,
    units_per_bundle: Option<i64>,
    weight: Option<u32>,
    policy_kind: Option<String>,
    policy_value: Option<i64>,
}

/// Extra columns written next to an [`OrderLineSnapshot`].
#[derive(Default)]
struct LineExtras<'a> {
    units_per_bundle: Option<i64>,
    weight: Option<u32>,
    policy_kind: Option<&'a str>,
    policy_value: Option<i64>,
    bundle_version: Option<i64>,
}

/// Order mutations for bundles.
#[derive(Debug, Clone)]
pub struct BundleOrderService {
    pool: SqlitePool,
    stacking: GlobalStackingPolicy,
    max_quantity: i64,
}

impl BundleOrderService {
    pub fn new(pool: SqlitePool, stacking: GlobalStackingPolicy, max_quantity: i64) -> Self {
        BundleOrderService {
            pool,
            stacking,
            max_quantity,
        }
    }

    fn validate_quantity(&self, quantity: i64) -> DbResult<()> {
        validate_bundle_quantity(quantity)?;
        if quantity > self.max_quantity {
            return Err(ValidationError::OutOfRange {
                field: "bundle quantity".to_string(),
                min: 1,
                max: self.max_quantity,
            }
            .into());
        }
        Ok(())
    }

    // =========================================================================
    // addBundle
    // =========================================================================

    /// Adds `quantity` copies of an Active bundle to an open order.
    ///
    /// ## Errors
    /// - `BundleNotActive` / `EmptyBundle` for unsellable definitions
    /// - `MissingPriceSnapshot`, `ZeroSubtotalProration`: rejected, nothing written
    /// - `ComponentUnavailable`: rejected, and the bundle is marked Broken
    pub async fn add_bundle(
        &self,
        order_id: &str,
        bundle_id: &str,
        quantity: i64,
    ) -> DbResult<AddedBundle> {
        self.validate_quantity(quantity)?;

        let mut tx = self.pool.begin().await?;
        ensure_open(&mut tx, order_id).await?;

        let definition = fetch_definition(&mut tx, bundle_id).await?;
        let component_ids: Vec<String> =
            definition.items.iter().map(|i| i.component_id.clone()).collect();
        let quotes = fetch_quotes(&mut tx, &component_ids).await?;

        let allocation = match allocate_definition(&definition, &quotes, quantity) {
            Ok(allocation) => allocation,
            Err(PricingError::ComponentUnavailable { component_id }) => {
                tx.rollback().await?;
                self.break_bundle(bundle_id, &component_id).await?;
                return Err(PricingError::ComponentUnavailable { component_id }.into());
            }
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let bundle_key = Uuid::new_v4().to_string();
        let (policy_kind, policy_value) = definition.policy.to_parts();

        let header = OrderLineSnapshot {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            bundle_key: bundle_key.clone(),
            bundle_id: bundle_id.to_string(),
            component_id: None,
            is_header: true,
            display_order: 0,
            quantity,
            base_unit_price_cents: 0,
            effective_unit_price_cents: 0,
            discount_cents: 0,
            discount_bps: 0,
            created_at: now,
            updated_at: now,
        };
        insert_line(
            &mut tx,
            &header,
            LineExtras {
                policy_kind: Some(policy_kind),
                policy_value: Some(policy_value),
                bundle_version: Some(definition.version),
                ..LineExtras::default()
            },
        )
        .await?;

        let mut children = Vec::with_capacity(allocation.lines.len());
        for line in &allocation.lines {
            let item = definition
                .items
                .iter()
                .find(|item| item.component_id == line.component_id)
                .ok_or_else(|| {
                    DbError::Internal(format!("allocated unknown component {}", line.component_id))
                })?;

            let child = child_line(&header, line, now);
            insert_line(
                &mut tx,
                &child,
                LineExtras {
                    units_per_bundle: Some(item.quantity),
                    weight: item.weight,
                    ..LineExtras::default()
                },
            )
            .await?;
            children.push(child);
        }

        tx.commit().await?;

        info!(
            order_id = %order_id,
            bundle_id = %bundle_id,
            bundle_key = %bundle_key,
            quantity,
            discount_cents = allocation.discount.cents(),
            drift_cents = allocation.drift.cents(),
            "Bundle added to order"
        );

        Ok(AddedBundle {
            bundle_key,
            header,
            children,
            discount: allocation.discount,
        })
    }

    /// Moves an Active bundle to Broken after an unavailable component was
    /// found while pricing it.
    async fn break_bundle(&self, bundle_id: &str, component_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE bundles SET status = 'broken', updated_at = ?2
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(bundle_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            warn!(
                bundle_id = %bundle_id,
                component_id = %component_id,
                "Bundle broken by unavailable component"
            );
        }
        Ok(())
    }

    // =========================================================================
    // adjustBundle
    // =========================================================================

    /// Reprices a bundle instance for a new multiplier and replaces its line
    /// snapshots. A quantity of 0 removes the bundle and returns no lines.
    ///
    /// Unit prices, item quantities, weights and the discount policy come
    /// from the snapshots taken when the bundle was added.
    pub async fn adjust_bundle(
        &self,
        order_id: &str,
        bundle_key: &str,
        new_quantity: i64,
    ) -> DbResult<Vec<OrderLineSnapshot>> {
        if new_quantity == 0 {
            self.remove_bundle(order_id, bundle_key).await?;
            return Ok(Vec::new());
        }
        self.validate_quantity(new_quantity)?;

        let mut tx = self.pool.begin().await?;
        ensure_open(&mut tx, order_id).await?;

        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT id, bundle_id, component_id, is_header, display_order,
                   base_unit_price_cents, units_per_bundle, weight,
                   policy_kind, policy_value
            FROM order_lines
            WHERE order_id = ?1 AND bundle_key = ?2
            ORDER BY is_header DESC, display_order, id
            "#,
        )
        .bind(order_id)
        .bind(bundle_key)
        .fetch_all(&mut *tx)
        .await?;

        let header = rows
            .iter()
            .find(|row| row.is_header)
            .ok_or_else(|| DbError::not_found("Bundle instance", bundle_key))?;
        let policy = match (&header.policy_kind, header.policy_value) {
            (Some(kind), Some(value)) => DiscountPolicy::from_parts(kind, value)?,
            _ => {
                return Err(DbError::Internal(format!(
                    "bundle {} has no policy snapshot",
                    bundle_key
                )))
            }
        };

        let children: Vec<&SnapshotRow> = rows.iter().filter(|row| !row.is_header).collect();
        let mut components = Vec::with_capacity(children.len());
        for row in &children {
            let component_id = row
                .component_id
                .clone()
                .ok_or_else(|| {
                    DbError::Internal(format!("component line {} has no component", row.id))
                })?;
            let units = row
                .units_per_bundle
                .ok_or_else(|| {
                    DbError::Internal(format!("component line {} has no unit snapshot", row.id))
                })?;
            components.push(PricedComponent {
                component_id,
                unit_price: Some(Money::from_cents(row.base_unit_price_cents)),
                quantity: units,
                weight: row.weight,
                display_order: row.display_order,
            });
        }

        let component_ids: Vec<String> =
            components.iter().map(|c| c.component_id.clone()).collect();
        let quotes = fetch_quotes(&mut tx, &component_ids).await?;
        for component_id in &component_ids {
            let available = quotes.iter().any(|q| &q.component_id == component_id && q.available);
            if !available {
                return Err(PricingError::ComponentUnavailable {
                    component_id: component_id.clone(),
                }
                .into());
            }
        }

        let allocation = allocate(&header.bundle_id, &policy, &components, new_quantity)?;
        let now = Utc::now();

        sqlx::query("UPDATE order_lines SET quantity = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&header.id)
            .bind(new_quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        for (row, line) in children.iter().zip(&allocation.lines) {
            sqlx::query(
                r#"
                UPDATE order_lines SET
                    quantity = ?2,
                    effective_unit_price_cents = ?3,
                    discount_cents = ?4,
                    discount_bps = ?5,
                    updated_at = ?6
                WHERE id = ?1
                "#,
            )
            .bind(&row.id)
            .bind(line.quantity)
            .bind(line.effective_unit_price.cents())
            .bind((-line.adjustment).cents())
            .bind(line.discount_rate.bps())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            restack(&mut tx, &row.id, line.subtotal, line.discount_rate, self.stacking.cap).await?;
        }

        let lines = fetch_bundle_lines(&mut tx, order_id, bundle_key).await?;
        tx.commit().await?;

        info!(
            order_id = %order_id,
            bundle_key = %bundle_key,
            quantity = new_quantity,
            discount_cents = allocation.discount.cents(),
            "Bundle quantity adjusted"
        );

        Ok(lines.into_iter().filter(|line| !line.is_header).collect())
    }

    // =========================================================================
    // removeBundle
    // =========================================================================

    /// Removes every line of a bundle instance (and their stacked
    /// adjustments).
    pub async fn remove_bundle(&self, order_id: &str, bundle_key: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        ensure_open(&mut tx, order_id).await?;

        let result = sqlx::query("DELETE FROM order_lines WHERE order_id = ?1 AND bundle_key = ?2")
            .bind(order_id)
            .bind(bundle_key)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Bundle instance", bundle_key));
        }

        tx.commit().await?;

        info!(
            order_id = %order_id,
            bundle_key = %bundle_key,
            lines = result.rows_affected(),
            "Bundle removed from order"
        );
        Ok(())
    }

    // =========================================================================
    // Promotion stacking hook
    // =========================================================================

    /// Asks the promotion guard whether a promotion may stack on a line and
    /// records the granted part as a separate adjustment.
    ///
    /// A clamped promotion is recorded at its clamped rate; nothing is
    /// recorded when the guard blocks it or the cap leaves no room.
    pub async fn apply_promotion(
        &self,
        order_line_id: &str,
        promotion_id: &str,
    ) -> DbResult<StackingDecision> {
        let mut tx = self.pool.begin().await?;

        let line = sqlx::query_as::<_, OrderLineSnapshot>(&format!(
            "SELECT {} FROM order_lines WHERE id = ?1",
            LINE_COLUMNS
        ))
        .bind(order_line_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Order line", order_line_id))?;

        ensure_open(&mut tx, &line.order_id).await?;

        if line.is_header {
            return Err(ValidationError::InvalidFormat {
                field: "order line".to_string(),
                reason: "bundle header lines carry no price".to_string(),
            }
            .into());
        }

        let promotion = sqlx::query_as::<_, Promotion>(
            "SELECT id, name, rate_bps, stacking, created_at FROM promotions WHERE id = ?1",
        )
        .bind(promotion_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Promotion", promotion_id))?;

        let bundle_override =
            sqlx::query_scalar::<_, BundleOverride>("SELECT stacking FROM bundles WHERE id = ?1")
                .bind(&line.bundle_id)
                .fetch_one(&mut *tx)
                .await?;

        let stacked_bps = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT SUM(rate_bps) FROM line_adjustments WHERE order_line_id = ?1",
        )
        .bind(order_line_id)
        .fetch_one(&mut *tx)
        .await?
        .unwrap_or(0);

        let rates = LineRates {
            has_bundle_key: !line.bundle_key.is_empty(),
            bundle_rate: line.discount_rate(),
            stacked_rate: Rate::from_bps(stacked_bps.clamp(0, u32::MAX as i64) as u32),
        };
        let decision = evaluate(
            &self.stacking,
            promotion.stacking,
            bundle_override,
            rates,
            promotion.rate(),
        );

        match decision.granted() {
            Some(granted) if !granted.is_zero() => {
                let amount = stacked_amount(line.subtotal(), granted);
                sqlx::query(
                    r#"
                    INSERT INTO line_adjustments (
                        id, order_line_id, promotion_id, rate_bps, amount_cents, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(order_line_id)
                .bind(promotion_id)
                .bind(granted.bps())
                .bind(amount.cents())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(|e| match DbError::from(e) {
                    DbError::UniqueViolation { .. } => {
                        DbError::duplicate("promotion on line", promotion_id)
                    }
                    other => other,
                })?;
            }
            _ => {}
        }

        tx.commit().await?;

        debug!(
            order_line_id = %order_line_id,
            promotion_id = %promotion_id,
            decision = ?decision,
            "Promotion stacking evaluated"
        );
        Ok(decision)
    }
}

fn child_line(
    header: &OrderLineSnapshot,
    line: &AllocatedLine,
    now: DateTime<Utc>,
) -> OrderLineSnapshot {
    OrderLineSnapshot {
        id: Uuid::new_v4().to_string(),
        order_id: header.order_id.clone(),
        bundle_key: header.bundle_key.clone(),
        bundle_id: header.bundle_id.clone(),
        component_id: Some(line.component_id.clone()),
        is_header: false,
        display_order: line.display_order,
        quantity: line.quantity,
        base_unit_price_cents: line.base_unit_price.cents(),
        effective_unit_price_cents: line.effective_unit_price.cents(),
        discount_cents: (-line.adjustment).cents(),
        discount_bps: line.discount_rate.bps(),
        created_at: now,
        updated_at: now,
    }
}

async fn insert_line(
    conn: &mut SqliteConnection,
    line: &OrderLineSnapshot,
    extras: LineExtras<'_>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO order_lines (
            id, order_id, bundle_key, bundle_id, component_id, is_header, display_order,
            quantity, base_unit_price_cents, effective_unit_price_cents, discount_cents,
            discount_bps, units_per_bundle, weight, policy_kind, policy_value,
            bundle_version, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            ?8, ?9, ?10, ?11,
            ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19
        )
        "#,
    )
    .bind(&line.id)
    .bind(&line.order_id)
    .bind(&line.bundle_key)
    .bind(&line.bundle_id)
    .bind(&line.component_id)
    .bind(line.is_header)
    .bind(line.display_order)
    .bind(line.quantity)
    .bind(line.base_unit_price_cents)
    .bind(line.effective_unit_price_cents)
    .bind(line.discount_cents)
    .bind(line.discount_bps)
    .bind(extras.units_per_bundle)
    .bind(extras.weight)
    .bind(extras.policy_kind)
    .bind(extras.policy_value)
    .bind(extras.bundle_version)
    .bind(line.created_at)
    .bind(line.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Re-clamps a line's stacked promotions against its new bundle rate and
/// recomputes their amounts over the new subtotal.
///
/// Each promotion is clamped from its requested rate in the order it was
/// applied, so headroom freed by a lower bundle rate is granted back.
async fn restack(
    conn: &mut SqliteConnection,
    order_line_id: &str,
    subtotal: Money,
    bundle_rate: Rate,
    cap: Option<Rate>,
) -> DbResult<()> {
    let requested = sqlx::query_as::<_, (String, u32)>(
        r#"
        SELECT a.id, p.rate_bps
        FROM line_adjustments a
        JOIN promotions p ON p.id = a.promotion_id
        WHERE a.order_line_id = ?1
        ORDER BY a.created_at, a.id
        "#,
    )
    .bind(order_line_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut stacked = Rate::zero();
    for (id, rate_bps) in requested {
        let granted = clamp_to_cap(bundle_rate, stacked, Rate::from_bps(rate_bps), cap);
        let amount = stacked_amount(subtotal, granted);
        sqlx::query("UPDATE line_adjustments SET rate_bps = ?2, amount_cents = ?3 WHERE id = ?1")
            .bind(&id)
            .bind(granted.bps())
            .bind(amount.cents())
            .execute(&mut *conn)
            .await?;
        stacked = stacked + granted;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PricingConfig;
    use crate::{Database, DbConfig};
    use bundle_core::{BundleStatus, PromotionOverride, StackingDefault};

    struct Fixture {
        db: Database,
        service: BundleOrderService,
        components: Vec<String>,
        order_id: String,
    }

    async fn fixture_with(prices: &[Option<i64>], config: PricingConfig) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut components = Vec::new();
        for (i, price) in prices.iter().enumerate() {
            let c = db
                .components()
                .create(&format!("C-{}", i), &format!("Component {}", i), *price)
                .await
                .unwrap();
            components.push(c.id);
        }
        let order_id = db.orders().create().await.unwrap().id;
        let service = db.bundle_orders(&config);
        Fixture {
            db,
            service,
            components,
            order_id,
        }
    }

    async fn fixture(prices: &[Option<i64>]) -> Fixture {
        fixture_with(prices, PricingConfig::default()).await
    }

    async fn active_bundle(f: &Fixture, policy: DiscountPolicy, weights: &[Option<u32>]) -> String {
        let bundle = f
            .db
            .bundles()
            .create_draft("Desk Kit", policy, BundleOverride::Inherit)
            .await
            .unwrap();
        for (i, id) in f.components.iter().enumerate() {
            let weight = weights.get(i).copied().flatten();
            f.db.bundles().add_item(&bundle.id, id, 1, weight).await.unwrap();
        }
        f.db.bundles().publish(&bundle.id).await.unwrap();
        bundle.id
    }

    fn percent_off(percent: u32) -> DiscountPolicy {
        DiscountPolicy::percent(Rate::from_percent(percent))
    }

    fn fixed_price(cents: i64) -> DiscountPolicy {
        DiscountPolicy::fixed(Money::from_cents(cents))
    }

    fn discounts(lines: &[OrderLineSnapshot]) -> Vec<i64> {
        lines.iter().map(|l| l.discount_cents).collect()
    }

    #[tokio::test]
    async fn test_add_percent_bundle() {
        let f = fixture(&[Some(3000), Some(4500)]).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;

        let added = f.service.add_bundle(&f.order_id, &bundle_id, 3).await.unwrap();

        assert!(added.header.is_header);
        assert_eq!(added.header.quantity, 3);
        assert_eq!(added.header.base_unit_price_cents, 0);
        assert_eq!(added.discount.cents(), 4500);
        assert_eq!(discounts(&added.children), vec![1800, 2700]);
        assert_eq!(added.children[0].quantity, 3);
        assert_eq!(added.children[0].effective_unit_price_cents, 2400);
        assert_eq!(added.children[1].effective_unit_price_cents, 3600);

        let stored = f.db.orders().lines(&f.order_id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|l| l.bundle_key == added.bundle_key));
    }

    #[tokio::test]
    async fn test_add_fixed_bundle() {
        let f = fixture(&[Some(3000), Some(2501)]).await;
        let bundle_id = active_bundle(&f, fixed_price(5000), &[]).await;

        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();
        assert_eq!(added.discount.cents(), 501);
        assert_eq!(discounts(&added.children), vec![273, 228]);
        let net: i64 = added.children.iter().map(|l| l.subtotal().cents() - l.discount_cents).sum();
        assert_eq!(net, 5000);
    }

    #[tokio::test]
    async fn test_adjust_uses_snapshot_prices() {
        let f = fixture(&[Some(3000), Some(4500)]).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();

        // Catalog price changes after the bundle was added
        f.db.components().set_price(&f.components[0], Some(9999)).await.unwrap();

        let lines = f.service.adjust_bundle(&f.order_id, &added.bundle_key, 2).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].base_unit_price_cents, 3000);
        assert_eq!(lines[0].quantity, 2);
        assert_eq!(discounts(&lines), vec![1200, 1800]);

        let all = f.db.orders().bundle_lines(&f.order_id, &added.bundle_key).await.unwrap();
        assert!(all[0].is_header);
        assert_eq!(all[0].quantity, 2);
        // Line ids survive an adjust
        assert_eq!(all[1].id, added.children[0].id);
    }

    #[tokio::test]
    async fn test_adjust_fixed_keeps_weights() {
        let f = fixture(&[Some(1000), Some(1000)]).await;
        let policy = DiscountPolicy::fixed(Money::from_cents(1000));
        let bundle_id = active_bundle(&f, policy, &[Some(3), Some(1)]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();
        assert_eq!(discounts(&added.children), vec![750, 250]);

        let lines = f.service.adjust_bundle(&f.order_id, &added.bundle_key, 2).await.unwrap();
        assert_eq!(discounts(&lines), vec![1500, 500]);
    }

    #[tokio::test]
    async fn test_adjust_to_zero_removes() {
        let f = fixture(&[Some(3000), Some(4500)]).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();

        let lines = f.service.adjust_bundle(&f.order_id, &added.bundle_key, 0).await.unwrap();
        assert!(lines.is_empty());
        assert!(f.db.orders().lines(&f.order_id).await.unwrap().is_empty());

        let err = f.service.remove_bundle(&f.order_id, &added.bundle_key).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_remove_only_touches_one_instance() {
        let f = fixture(&[Some(3000), Some(4500)]).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;
        let first = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();
        let second = f.service.add_bundle(&f.order_id, &bundle_id, 2).await.unwrap();
        assert_ne!(first.bundle_key, second.bundle_key);

        f.service.remove_bundle(&f.order_id, &first.bundle_key).await.unwrap();
        let remaining = f.db.orders().lines(&f.order_id).await.unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().all(|l| l.bundle_key == second.bundle_key));
    }

    #[tokio::test]
    async fn test_missing_price_writes_nothing() {
        let f = fixture(&[Some(3000), Some(4500)]).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;
        f.db.components().set_price(&f.components[1], None).await.unwrap();

        let err = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap_err();
        assert!(matches!(err, DbError::Pricing(PricingError::MissingPriceSnapshot { .. })));
        assert!(err.is_user_visible());
        assert!(f.db.orders().lines(&f.order_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overrun_writes_nothing() {
        let f = fixture(&[Some(100), Some(1000)]).await;
        let policy = DiscountPolicy::fixed(Money::from_cents(100));
        let bundle_id = active_bundle(&f, policy, &[Some(100), Some(1)]).await;

        let err = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap_err();
        assert!(matches!(err, DbError::Pricing(PricingError::ProrationOverrun { .. })));
        assert!(f.db.orders().lines(&f.order_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_subtotal_rejected() {
        let f = fixture(&[Some(0), Some(0)]).await;
        let bundle_id = active_bundle(&f, DiscountPolicy::fixed(Money::zero()), &[]).await;

        let err = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap_err();
        assert!(matches!(err, DbError::Pricing(PricingError::ZeroSubtotalProration { .. })));
    }

    #[tokio::test]
    async fn test_unavailable_component_on_add_breaks_bundle() {
        let f = fixture(&[Some(3000), Some(4500)]).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;

        // Availability flipped outside set_availability, so the bundle is still Active
        sqlx::query("UPDATE components SET is_available = 0 WHERE id = ?1")
            .bind(&f.components[1])
            .execute(f.db.pool())
            .await
            .unwrap();

        let err = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap_err();
        assert!(matches!(err, DbError::Pricing(PricingError::ComponentUnavailable { .. })));
        assert!(f.db.orders().lines(&f.order_id).await.unwrap().is_empty());

        let bundle = f.db.bundles().get_by_id(&bundle_id).await.unwrap().unwrap();
        assert_eq!(bundle.status, BundleStatus::Broken);
    }

    #[tokio::test]
    async fn test_adjust_rejects_unavailable_component() {
        let f = fixture(&[Some(3000), Some(4500)]).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();

        f.db.components().set_availability(&f.components[0], false).await.unwrap();

        let err = f.service.adjust_bundle(&f.order_id, &added.bundle_key, 2).await.unwrap_err();
        assert!(matches!(err, DbError::Pricing(PricingError::ComponentUnavailable { .. })));

        let lines = f.db.orders().bundle_lines(&f.order_id, &added.bundle_key).await.unwrap();
        assert_eq!(lines[0].quantity, 1);
        assert_eq!(discounts(&lines[1..]), vec![600, 900]);
    }

    #[tokio::test]
    async fn test_inactive_bundle_rejected() {
        let f = fixture(&[Some(3000)]).await;
        let draft = f
            .db
            .bundles()
            .create_draft("Draft", percent_off(10), BundleOverride::Inherit)
            .await
            .unwrap();

        let err = f.service.add_bundle(&f.order_id, &draft.id, 1).await.unwrap_err();
        assert!(matches!(err, DbError::Pricing(PricingError::BundleNotActive { .. })));
    }

    #[tokio::test]
    async fn test_quantity_limits() {
        let mut config = PricingConfig::default();
        config.limits.max_bundle_quantity = 5;
        let f = fixture_with(&[Some(3000)], config).await;
        let bundle_id = active_bundle(&f, percent_off(10), &[]).await;

        assert!(f.service.add_bundle(&f.order_id, &bundle_id, 6).await.is_err());
        assert!(f.service.add_bundle(&f.order_id, &bundle_id, -1).await.is_err());
        assert!(f.service.add_bundle(&f.order_id, &bundle_id, 5).await.is_ok());
    }

    #[tokio::test]
    async fn test_placed_order_is_frozen() {
        let f = fixture(&[Some(3000)]).await;
        let bundle_id = active_bundle(&f, percent_off(10), &[]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();
        f.db.orders().place(&f.order_id).await.unwrap();

        assert!(matches!(
            f.service.add_bundle(&f.order_id, &bundle_id, 1).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(f.service.adjust_bundle(&f.order_id, &added.bundle_key, 2).await.is_err());
        assert!(f.service.remove_bundle(&f.order_id, &added.bundle_key).await.is_err());
    }

    #[tokio::test]
    async fn test_discard_cascades_lines() {
        let f = fixture(&[Some(3000)]).await;
        let bundle_id = active_bundle(&f, percent_off(10), &[]).await;
        f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();

        f.db.orders().discard(&f.order_id).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_lines")
            .fetch_one(f.db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    fn allow_with_cap(cap_bps: u32) -> PricingConfig {
        let mut config = PricingConfig::default();
        config.stacking.default = StackingDefault::Allow;
        config.stacking.cap_bps = Some(cap_bps);
        config
    }

    #[tokio::test]
    async fn test_promotion_clamped_to_cap() {
        let f = fixture_with(&[Some(3000)], allow_with_cap(4000)).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();
        let promo = f
            .db
            .promotions()
            .create("Spring Sale", Rate::from_percent(30), PromotionOverride::Inherit)
            .await
            .unwrap();

        let line_id = &added.children[0].id;
        let decision = f.service.apply_promotion(line_id, &promo.id).await.unwrap();
        assert_eq!(
            decision,
            StackingDecision::Clamped {
                requested: Rate::from_percent(30),
                granted: Rate::from_percent(20),
            }
        );

        let adjustments = f.db.orders().adjustments(line_id).await.unwrap();
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments[0].rate_bps, 2000);
        assert_eq!(adjustments[0].amount_cents, 600);

        // The bundle's own discount is untouched
        let lines = f.db.orders().bundle_lines(&f.order_id, &added.bundle_key).await.unwrap();
        assert_eq!(lines[1].discount_cents, 600);

        // Same promotion twice is a duplicate
        let err = f.service.apply_promotion(line_id, &promo.id).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_cap_reached_records_nothing() {
        let f = fixture_with(&[Some(3000)], allow_with_cap(4000)).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();
        let promos = f.db.promotions();
        let first = promos
            .create("A", Rate::from_percent(20), PromotionOverride::Inherit)
            .await
            .unwrap();
        let second = promos
            .create("B", Rate::from_percent(10), PromotionOverride::Inherit)
            .await
            .unwrap();

        let line_id = &added.children[0].id;
        f.service.apply_promotion(line_id, &first.id).await.unwrap();
        let decision = f.service.apply_promotion(line_id, &second.id).await.unwrap();
        assert_eq!(decision.granted(), Some(Rate::zero()));
        assert_eq!(f.db.orders().adjustments(line_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_promotion_blocked_by_default() {
        let f = fixture(&[Some(3000)]).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();
        let promo = f
            .db
            .promotions()
            .create("Spring Sale", Rate::from_percent(30), PromotionOverride::Inherit)
            .await
            .unwrap();

        let line_id = &added.children[0].id;
        let decision = f.service.apply_promotion(line_id, &promo.id).await.unwrap();
        assert!(matches!(decision, StackingDecision::Blocked { .. }));
        assert!(f.db.orders().adjustments(line_id).await.unwrap().is_empty());

        // Bundle override wins over the global default
        f.db.bundles().set_stacking(&bundle_id, BundleOverride::Yes).await.unwrap();
        let decision = f.service.apply_promotion(line_id, &promo.id).await.unwrap();
        assert_eq!(decision, StackingDecision::Applied { granted: Rate::from_percent(30) });
        assert_eq!(f.db.orders().adjustments(line_id).await.unwrap()[0].amount_cents, 900);
    }

    #[tokio::test]
    async fn test_header_line_rejects_promotion() {
        let f = fixture(&[Some(3000)]).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();
        let promo = f
            .db
            .promotions()
            .create("Spring Sale", Rate::from_percent(30), PromotionOverride::Always)
            .await
            .unwrap();

        let err = f.service.apply_promotion(&added.header.id, &promo.id).await.unwrap_err();
        assert!(matches!(err, DbError::Pricing(PricingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_adjust_rescales_stacked_promotions() {
        let f = fixture_with(&[Some(3000)], allow_with_cap(10_000)).await;
        let bundle_id = active_bundle(&f, percent_off(20), &[]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();
        let promo = f
            .db
            .promotions()
            .create("Spring Sale", Rate::from_percent(10), PromotionOverride::Inherit)
            .await
            .unwrap();

        let line_id = &added.children[0].id;
        f.service.apply_promotion(line_id, &promo.id).await.unwrap();
        assert_eq!(f.db.orders().adjustments(line_id).await.unwrap()[0].amount_cents, 300);

        f.service.adjust_bundle(&f.order_id, &added.bundle_key, 3).await.unwrap();
        assert_eq!(f.db.orders().adjustments(line_id).await.unwrap()[0].amount_cents, 900);
    }

    #[tokio::test]
    async fn test_adjust_reclamps_stacked_promotions_to_cap() {
        // 1¢ for two 1¢ components: the rounding correction leaves the first
        // line undiscounted at quantity 1 and half off at quantity 2
        let f = fixture_with(&[Some(1), Some(1)], allow_with_cap(5000)).await;
        let bundle_id = active_bundle(&f, fixed_price(1), &[]).await;
        let added = f.service.add_bundle(&f.order_id, &bundle_id, 1).await.unwrap();
        assert_eq!(added.children[0].discount_bps, 0);

        let promo = f
            .db
            .promotions()
            .create("Spring Sale", Rate::from_percent(50), PromotionOverride::Inherit)
            .await
            .unwrap();
        let line_id = &added.children[0].id;
        let decision = f.service.apply_promotion(line_id, &promo.id).await.unwrap();
        assert_eq!(decision, StackingDecision::Applied { granted: Rate::from_percent(50) });

        let lines = f.service.adjust_bundle(&f.order_id, &added.bundle_key, 2).await.unwrap();
        assert_eq!(lines[0].discount_bps, 5000);
        let adjustments = f.db.orders().adjustments(line_id).await.unwrap();
        assert_eq!(adjustments[0].rate_bps, 0);
        assert_eq!(adjustments[0].amount_cents, 0);

        // Headroom comes back with the lower bundle rate
        f.service.adjust_bundle(&f.order_id, &added.bundle_key, 1).await.unwrap();
        let adjustments = f.db.orders().adjustments(line_id).await.unwrap();
        assert_eq!(adjustments[0].rate_bps, 5000);
        assert_eq!(adjustments[0].amount_cents, 1);
    }
}
