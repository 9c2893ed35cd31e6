//! Security event taxonomy.
//!
//! Every event is built from a [`SecurityEventKind`], which fixes both the
//! stored `event_type` and its `severity`. An inconsistent pairing cannot be
//! constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use super::ids::{ActorId, SecurityEventId};
use super::request::RequestContext;

/// Strings longer than this are replaced by a length label in event details.
pub const MAX_DETAIL_STRING_LEN: usize = 200;

/// Arrays longer than this are replaced by a length label in event details.
pub const MAX_DETAIL_ARRAY_LEN: usize = 20;

const REDACTED: &str = "[redacted]";

const SENSITIVE_KEY_FRAGMENTS: &[&str] =
    &["token", "password", "secret", "authorization", "cookie"];

/// Closed set of stored event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AuthFailure,
    AuthSuccess,
    RateLimitExceeded,
    InvalidInput,
    UnauthorizedAccess,
    AdminAccess,
    SuspiciousActivity,
    CspViolation,
    ApiError,
    ValidationFailure,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AuthFailure => "auth_failure",
            EventType::AuthSuccess => "auth_success",
            EventType::RateLimitExceeded => "rate_limit_exceeded",
            EventType::InvalidInput => "invalid_input",
            EventType::UnauthorizedAccess => "unauthorized_access",
            EventType::AdminAccess => "admin_access",
            EventType::SuspiciousActivity => "suspicious_activity",
            EventType::CspViolation => "csp_violation",
            EventType::ApiError => "api_error",
            EventType::ValidationFailure => "validation_failure",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of severities, ordered from least to most urgent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// High and critical events are triaged first.
    pub fn is_urgent(&self) -> bool {
        *self >= Severity::High
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened, with the facts worth keeping for triage.
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityEventKind {
    AuthFailure { reason: String },
    AuthSuccess,
    RateLimitExceeded { limit: u32, retry_after: u64 },
    InvalidInput { field: String, reason: String },
    UnauthorizedAccess { resource: String },
    AdminAccess { action: String },
    SuspiciousActivity { reason: String, details: Value },
    CspViolation { report: Value },
    ApiError { message: String },
    ValidationFailure { field: String, reason: String },
}

impl SecurityEventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            SecurityEventKind::AuthFailure { .. } => EventType::AuthFailure,
            SecurityEventKind::AuthSuccess => EventType::AuthSuccess,
            SecurityEventKind::RateLimitExceeded { .. } => EventType::RateLimitExceeded,
            SecurityEventKind::InvalidInput { .. } => EventType::InvalidInput,
            SecurityEventKind::UnauthorizedAccess { .. } => EventType::UnauthorizedAccess,
            SecurityEventKind::AdminAccess { .. } => EventType::AdminAccess,
            SecurityEventKind::SuspiciousActivity { .. } => EventType::SuspiciousActivity,
            SecurityEventKind::CspViolation { .. } => EventType::CspViolation,
            SecurityEventKind::ApiError { .. } => EventType::ApiError,
            SecurityEventKind::ValidationFailure { .. } => EventType::ValidationFailure,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SecurityEventKind::AuthSuccess
            | SecurityEventKind::AdminAccess { .. }
            | SecurityEventKind::InvalidInput { .. }
            | SecurityEventKind::ValidationFailure { .. } => Severity::Low,
            SecurityEventKind::AuthFailure { .. }
            | SecurityEventKind::RateLimitExceeded { .. }
            | SecurityEventKind::CspViolation { .. }
            | SecurityEventKind::ApiError { .. } => Severity::Medium,
            SecurityEventKind::UnauthorizedAccess { .. }
            | SecurityEventKind::SuspiciousActivity { .. } => Severity::High,
        }
    }

    /// Structured details, already passed through [`sanitize_details`].
    pub fn details(&self) -> Value {
        let raw = match self {
            SecurityEventKind::AuthFailure { reason } => json!({ "reason": reason }),
            SecurityEventKind::AuthSuccess => json!({}),
            SecurityEventKind::RateLimitExceeded { limit, retry_after } => json!({
                "limit": limit,
                "retryAfter": retry_after,
            }),
            SecurityEventKind::InvalidInput { field, reason }
            | SecurityEventKind::ValidationFailure { field, reason } => json!({
                "field": field,
                "reason": reason,
            }),
            SecurityEventKind::UnauthorizedAccess { resource } => json!({ "resource": resource }),
            SecurityEventKind::AdminAccess { action } => json!({ "action": action }),
            SecurityEventKind::SuspiciousActivity { reason, details } => {
                let mut map = match details {
                    Value::Object(map) => map.clone(),
                    Value::Null => Map::new(),
                    other => {
                        let mut map = Map::new();
                        map.insert("context".to_string(), other.clone());
                        map
                    }
                };
                map.insert("reason".to_string(), Value::String(reason.clone()));
                Value::Object(map)
            }
            SecurityEventKind::CspViolation { report } => json!({ "report": report }),
            SecurityEventKind::ApiError { message } => json!({ "message": message }),
        };

        sanitize_details(raw)
    }
}

/// Append-only record of one security-relevant occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: SecurityEventId,
    pub event_type: EventType,
    pub severity: Severity,
    pub actor_id: Option<ActorId>,
    pub actor_email: Option<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// Build an event from its kind; type, severity and details all derive from it.
    pub fn new(kind: SecurityEventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: SecurityEventId::new(),
            event_type: kind.event_type(),
            severity: kind.severity(),
            actor_id: None,
            actor_email: None,
            origin: None,
            user_agent: None,
            endpoint: None,
            method: None,
            status_code: None,
            details: kind.details(),
            timestamp,
        }
    }

    /// Copy actor, origin, user agent, endpoint and method from the request.
    pub fn with_context(mut self, ctx: &RequestContext) -> Self {
        self.actor_id = ctx.actor_id.clone();
        self.actor_email = ctx.actor_email.clone();
        self.origin = Some(ctx.origin.clone());
        self.user_agent = ctx
            .user_agent
            .as_deref()
            .map(|ua| truncate_label(ua, MAX_DETAIL_STRING_LEN));
        self.endpoint = Some(ctx.endpoint.clone());
        self.method = Some(ctx.method.clone());
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// Strip secrets and oversized payloads from event details.
///
/// Non-boolean values under keys that look like credentials are redacted, long strings and arrays are
/// replaced with a label carrying their length. Applied recursively.
pub fn sanitize_details(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    // Flags such as `headerTokenPresent` carry no secret.
                    if is_sensitive_key(&key) && !matches!(value, Value::Bool(_) | Value::Null) {
                        (key, Value::String(REDACTED.to_string()))
                    } else {
                        (key, sanitize_details(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) if items.len() > MAX_DETAIL_ARRAY_LEN => {
            Value::String(format!("[array of length {}]", items.len()))
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_details).collect()),
        Value::String(s) => Value::String(truncate_label(&s, MAX_DETAIL_STRING_LEN)),
        other => other,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| lower.contains(fragment))
}

fn truncate_label(value: &str, max_len: usize) -> String {
    let len = value.chars().count();
    if len > max_len {
        format!("[string of length {}]", len)
    } else {
        value.to_string()
    }
}
