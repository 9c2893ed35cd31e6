use anyhow::Result;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use exam_gateway_api::{
    observability::{init_logging, init_metrics, metrics_handler},
    routes,
    security::{CsrfConfig, CsrfGuard, FixedWindowRateLimiter, SecurityEventLog, TracingEventSink},
    SecurityGateway,
};
use exam_gateway_core::{RateLimitStore, SecurityEventSink};
use exam_gateway_storage::{
    postgres::{self, PostgresConfig},
    InMemoryRateLimitStore, PgRateLimitStore, PgSecurityEventStore,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::trace::TraceLayer;

mod config;

/// How long shutdown waits for queued security events to be delivered
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::load()?;

    init_logging(&config.log).map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;
    init_metrics()?;
    tracing::info!(environment = %config.environment, "Starting exam gateway");

    let policies = config.policy_table()?;
    tracing::info!(policies = policies.len(), "Rate limit policies loaded");

    let pool = match &config.database_url {
        Some(url) => {
            let pool = postgres::create_lazy_pool(&PostgresConfig::new(url.clone()))?;
            if let Err(e) = postgres::migrate(&pool).await {
                tracing::warn!(error = %e, "Migrations not applied; database may be unreachable");
            }
            Some(pool)
        }
        None => {
            tracing::warn!("No database configured; using in-memory counters and log-only events");
            None
        }
    };

    let (counters, sink): (Arc<dyn RateLimitStore>, Arc<dyn SecurityEventSink>) = match &pool {
        Some(pool) => (
            Arc::new(PgRateLimitStore::new(pool.clone())),
            Arc::new(PgSecurityEventStore::new(pool.clone())),
        ),
        None => (Arc::new(InMemoryRateLimitStore::new()), Arc::new(TracingEventSink)),
    };

    let (events, event_worker) = SecurityEventLog::spawn(sink, config.event_queue_capacity);
    let limiter = FixedWindowRateLimiter::new(counters, policies);
    let csrf = CsrfGuard::new(CsrfConfig::for_environment(&config.environment));
    let gateway = SecurityGateway::new(limiter, csrf, events);

    let pruner = tokio::spawn(prune_counters(
        Arc::clone(&gateway.limiter),
        Duration::from_secs(config.prune_interval_secs.max(1)),
        chrono::Duration::hours(config.counter_retention_hours),
    ));

    let app = Router::new()
        .route("/health", get(health_check))
        .with_state(pool)
        .route("/metrics", get(metrics_handler))
        .nest("/api", routes(gateway))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and with it every event sender) is gone; let the worker drain.
    pruner.abort();
    if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, event_worker).await.is_err() {
        tracing::warn!("Timed out delivering queued security events");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn health_check(State(pool): State<Option<PgPool>>) -> (StatusCode, Json<Value>) {
    let database = match &pool {
        Some(pool) => match postgres::health_check(pool).await {
            Ok(()) => "up",
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                "down"
            }
        },
        None => "not_configured",
    };

    // A down database degrades the gateway but does not take it out of service
    (StatusCode::OK, Json(json!({ "status": "ok", "database": database })))
}

async fn prune_counters(
    limiter: Arc<FixedWindowRateLimiter>,
    every: Duration,
    retention: chrono::Duration,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match limiter.prune_expired(retention).await {
            Ok(0) => {}
            Ok(pruned) => tracing::info!(pruned, "Pruned expired rate limit windows"),
            Err(e) => tracing::warn!(error = %e, "Failed to prune rate limit windows"),
        }
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
