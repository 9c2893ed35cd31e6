use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Configuration for the PostgreSQL pool backing rate limits and security events
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Kept short: a slow pool must degrade the rate limiter, not stall requests
    pub acquire_timeout_ms: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_ms: 500,
            idle_timeout_seconds: 600,
        }
    }
}

impl PostgresConfig {
    pub fn new(database_url: String) -> Self {
        Self {
            database_url,
            ..Default::default()
        }
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_millis(self.acquire_timeout_ms))
            .idle_timeout(Some(Duration::from_secs(self.idle_timeout_seconds)))
    }
}

/// Create a PostgreSQL connection pool with default settings
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let config = PostgresConfig::new(database_url.to_string());
    create_pool_with_config(&config).await
}

/// Create a pool and connect eagerly, failing if the database is unreachable
pub async fn create_pool_with_config(config: &PostgresConfig) -> Result<PgPool> {
    let pool = config.pool_options().connect(&config.database_url).await?;

    tracing::info!(
        "PostgreSQL connection pool created (max: {}, acquire timeout: {}ms)",
        config.max_connections,
        config.acquire_timeout_ms
    );

    Ok(pool)
}

/// Create a pool that connects on first use.
///
/// The gateway still starts while the database is down; the rate limiter then
/// fails open and security events fall back to local logging.
pub fn create_lazy_pool(config: &PostgresConfig) -> Result<PgPool> {
    let pool = config.pool_options().connect_lazy(&config.database_url)?;
    tracing::info!("PostgreSQL pool configured lazily (max: {})", config.max_connections);
    Ok(pool)
}

/// Run database migrations
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Health check for database connection
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;

    tracing::debug!("Database health check passed");
    Ok(())
}
