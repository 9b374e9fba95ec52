//! # Promotion Repository
//!
//! Non-bundle promotions that the guard may stack on bundle lines.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use bundle_core::validation::{validate_name, validate_rate_bps};
use bundle_core::{Promotion, PromotionOverride, Rate};

#[derive(Debug, Clone)]
pub struct PromotionRepository {
    pool: SqlitePool,
}

impl PromotionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PromotionRepository { pool }
    }

    pub async fn create(
        &self,
        name: &str,
        rate: Rate,
        stacking: PromotionOverride,
    ) -> DbResult<Promotion> {
        validate_name("promotion name", name)?;
        validate_rate_bps("promotion rate", rate.bps())?;

        let promotion = Promotion {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            rate_bps: rate.bps(),
            stacking,
            created_at: Utc::now(),
        };

        debug!(id = %promotion.id, rate_bps = promotion.rate_bps, "Creating promotion");

        sqlx::query(
            r#"
            INSERT INTO promotions (id, name, rate_bps, stacking, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&promotion.id)
        .bind(&promotion.name)
        .bind(promotion.rate_bps)
        .bind(promotion.stacking)
        .bind(promotion.created_at)
        .execute(&self.pool)
        .await?;

        Ok(promotion)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Promotion>> {
        let promotion = sqlx::query_as::<_, Promotion>(
            "SELECT id, name, rate_bps, stacking, created_at FROM promotions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(promotion)
    }

    pub async fn set_stacking(&self, id: &str, stacking: PromotionOverride) -> DbResult<()> {
        let result = sqlx::query("UPDATE promotions SET stacking = ?2 WHERE id = ?1")
            .bind(id)
            .bind(stacking)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Promotion", id));
        }
        Ok(())
    }
}
