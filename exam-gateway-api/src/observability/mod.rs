//! Observability: structured logging and Prometheus metrics

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, metrics_handler, MetricsError, SecurityMetrics};
