//! Best-effort security event delivery
//!
//! Callers submit events to a bounded queue and return immediately. A single
//! worker task drains the queue into the configured sink. A full queue drops
//! the event; a failing sink falls back to local structured output.

use async_trait::async_trait;
use exam_gateway_core::{
    Clock, RequestContext, Result as CoreResult, SecurityEvent, SecurityEventKind,
    SecurityEventSink, Severity, SystemClock,
};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::observability::metrics::SecurityMetrics;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Handle for submitting security events. Cheap to clone.
#[derive(Clone)]
pub struct SecurityEventLog {
    sender: mpsc::Sender<SecurityEvent>,
    clock: Arc<dyn Clock>,
}

impl SecurityEventLog {
    /// Start the delivery worker. It exits once every handle has been dropped
    /// and the queue is drained.
    pub fn spawn(sink: Arc<dyn SecurityEventSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(deliver(sink, receiver));

        (
            Self {
                sender,
                clock: Arc::new(SystemClock),
            },
            worker,
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Submit an event without waiting for delivery.
    pub fn log(&self, event: SecurityEvent) {
        SecurityMetrics::record_security_event(event.event_type, event.severity);

        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                SecurityMetrics::record_event_dropped();
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Security event queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(event)) => write_locally(&event),
        }
    }

    /// Build an event of `kind` for the request described by `ctx` and submit it.
    pub fn record(&self, kind: SecurityEventKind, ctx: &RequestContext, status_code: Option<u16>) {
        let mut event = SecurityEvent::new(kind, self.clock.now()).with_context(ctx);
        if let Some(status) = status_code {
            event = event.with_status(status);
        }
        self.log(event);
    }
}

async fn deliver(sink: Arc<dyn SecurityEventSink>, mut receiver: mpsc::Receiver<SecurityEvent>) {
    while let Some(event) = receiver.recv().await {
        if let Err(err) = sink.append(&event).await {
            SecurityMetrics::record_event_delivery_failure();
            warn!(error = %err, event_id = %event.id, "Security event sink failed, logging locally");
            write_locally(&event);
        }
    }
}

/// Emit the event as a structured log line under the `security_event` target.
pub(crate) fn write_locally(event: &SecurityEvent) {
    let details = event.details.to_string();
    let actor_id = event.actor_id.as_ref().map(|a| a.to_string());

    macro_rules! emit {
        ($level:ident) => {
            $level!(
                target: "security_event",
                event_id = %event.id,
                event_type = %event.event_type,
                severity = %event.severity,
                actor_id = ?actor_id,
                origin = ?event.origin,
                endpoint = ?event.endpoint,
                method = ?event.method,
                status_code = ?event.status_code,
                details = %details,
                timestamp = %event.timestamp,
                "Security event"
            )
        };
    }

    match event.severity {
        Severity::Critical => emit!(error),
        Severity::High => emit!(warn),
        Severity::Low | Severity::Medium => emit!(info),
    }
}

/// Sink that only writes structured logs; used when no database is configured
/// for events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl SecurityEventSink for TracingEventSink {
    async fn append(&self, event: &SecurityEvent) -> CoreResult<()> {
        write_locally(event);
        Ok(())
    }
}
