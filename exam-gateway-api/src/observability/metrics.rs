//! Prometheus metrics for the security gateway
//!
//! Recording functions go through the `metrics` facade and are no-ops until
//! [`init_metrics`] installs the Prometheus recorder.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use exam_gateway_core::{EventType, Severity};
use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::error;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to install metrics recorder: {0}")]
    Installation(String),
}

/// Install the Prometheus recorder. Later calls are no-ops.
pub fn init_metrics() -> Result<(), MetricsError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Installation("Handle already set".to_string()))?;

    register_metric_descriptions();
    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!(
        "rate_limit_checks_total",
        Unit::Count,
        "Rate limit decisions by endpoint and outcome"
    );
    describe_counter!(
        "rate_limit_store_failures_total",
        Unit::Count,
        "Rate limit checks that failed open because the counter store was unreachable"
    );
    describe_counter!(
        "csrf_rejections_total",
        Unit::Count,
        "Unsafe requests rejected for a missing or mismatched CSRF token"
    );
    describe_counter!(
        "validation_failures_total",
        Unit::Count,
        "Rejected input fields, split into malformed and adversarial"
    );
    describe_counter!(
        "security_events_total",
        Unit::Count,
        "Security events submitted, by type and severity"
    );
    describe_counter!(
        "security_events_dropped_total",
        Unit::Count,
        "Security events dropped because the delivery queue was full"
    );
    describe_counter!(
        "security_event_delivery_failures_total",
        Unit::Count,
        "Security events the sink rejected and that were logged locally instead"
    );
}

/// Render metrics for Prometheus scraping
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => {
            error!("Metrics handler called but metrics not initialized");
            (StatusCode::INTERNAL_SERVER_ERROR, "Metrics not initialized").into_response()
        }
    }
}

/// Counters emitted by the security components
pub struct SecurityMetrics;

impl SecurityMetrics {
    pub fn record_rate_limit_check(endpoint: &str, allowed: bool) {
        let outcome = if allowed { "allowed" } else { "denied" };
        counter!(
            "rate_limit_checks_total",
            "endpoint" => endpoint.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }

    pub fn record_rate_limit_store_failure() {
        counter!("rate_limit_store_failures_total").increment(1);
    }

    pub fn record_csrf_rejection() {
        counter!("csrf_rejections_total").increment(1);
    }

    pub fn record_validation_failure(adversarial: bool) {
        let kind = if adversarial { "adversarial" } else { "malformed" };
        counter!("validation_failures_total", "kind" => kind).increment(1);
    }

    pub fn record_security_event(event_type: EventType, severity: Severity) {
        counter!(
            "security_events_total",
            "event_type" => event_type.as_str(),
            "severity" => severity.as_str()
        )
        .increment(1);
    }

    pub fn record_event_dropped() {
        counter!("security_events_dropped_total").increment(1);
    }

    pub fn record_event_delivery_failure() {
        counter!("security_event_delivery_failures_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        SecurityMetrics::record_rate_limit_check("auth/login", false);
        SecurityMetrics::record_validation_failure(true);
        SecurityMetrics::record_security_event(EventType::SuspiciousActivity, Severity::High);
        SecurityMetrics::record_event_dropped();
    }

    #[tokio::test]
    async fn test_metrics_handler_before_init() {
        if PROMETHEUS_HANDLE.get().is_none() {
            let response = metrics_handler().await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
