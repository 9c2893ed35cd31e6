use async_trait::async_trait;
use exam_gateway_core::{Result, SecurityEvent, SecurityEventSink};
use sqlx::PgPool;

/// Appends to the `security_events` table. There is no update or delete path.
pub struct PgSecurityEventStore {
    pool: PgPool,
}

impl PgSecurityEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecurityEventSink for PgSecurityEventStore {
    async fn append(&self, event: &SecurityEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO security_events (
                id, event_type, severity, actor_id, actor_email, origin,
                user_agent, endpoint, method, status_code, details, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(event.id.0)
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(event.actor_id.as_ref().map(|id| id.as_str()))
        .bind(event.actor_email.as_deref())
        .bind(event.origin.as_deref())
        .bind(event.user_agent.as_deref())
        .bind(event.endpoint.as_deref())
        .bind(event.method.as_deref())
        .bind(event.status_code.map(i32::from))
        .bind(&event.details)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
