use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_gateway_core::{RateLimitRecord, RateLimitStore, Result, WindowKey};
use sqlx::{PgPool, Row};

/// Fixed-window counters in the `rate_limits` table.
pub struct PgRateLimitStore {
    pool: PgPool,
}

impl PgRateLimitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All records for an identifier, newest window first
    pub async fn list_for_identifier(&self, identifier: &str) -> Result<Vec<RateLimitRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT identifier, endpoint, window_start, request_count
            FROM rate_limits
            WHERE identifier = $1
            ORDER BY window_start DESC
            "#,
        )
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| RateLimitRecord {
                identifier: row.get("identifier"),
                endpoint: row.get("endpoint"),
                window_start: row.get("window_start"),
                request_count: row.get("request_count"),
            })
            .collect())
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn upsert_increment(&self, key: &WindowKey) -> Result<i64> {
        // A missing unique constraint surfaces as SQLSTATE 42P10, which
        // converts to CoreError::Unsupported.
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limits (identifier, endpoint, window_start, request_count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (identifier, endpoint, window_start)
            DO UPDATE SET request_count = rate_limits.request_count + 1,
                          updated_at = NOW()
            RETURNING request_count
            "#,
        )
        .bind(&key.identifier)
        .bind(&key.endpoint)
        .bind(key.window_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn fetch_count(&self, key: &WindowKey) -> Result<Option<i64>> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT request_count
            FROM rate_limits
            WHERE identifier = $1 AND endpoint = $2 AND window_start = $3
            "#,
        )
        .bind(&key.identifier)
        .bind(&key.endpoint)
        .bind(key.window_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count)
    }

    async fn store_count(&self, key: &WindowKey, count: i64) -> Result<()> {
        // Deliberately no ON CONFLICT here: this is the path taken when the
        // upsert primitive is unavailable.
        let updated = sqlx::query(
            r#"
            UPDATE rate_limits
            SET request_count = $4, updated_at = NOW()
            WHERE identifier = $1 AND endpoint = $2 AND window_start = $3
            "#,
        )
        .bind(&key.identifier)
        .bind(&key.endpoint)
        .bind(key.window_start)
        .bind(count)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO rate_limits (identifier, endpoint, window_start, request_count)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&key.identifier)
            .bind(&key.endpoint)
            .bind(key.window_start)
            .bind(count)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE window_start < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
