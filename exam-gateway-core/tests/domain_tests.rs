use exam_gateway_core::*;
use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use test_case::test_case;

// ===== PolicyTable Tests =====

#[test]
fn test_policy_lookup_falls_back_to_default() {
    let table = PolicyTable::with_default(EndpointPolicy::new(60_000, 100))
        .with_policy("auth/login", EndpointPolicy::new(300_000, 10));

    assert_eq!(table.lookup("auth/login"), EndpointPolicy::new(300_000, 10));
    assert_eq!(table.lookup("questions/list"), EndpointPolicy::new(60_000, 100));
}

#[test]
fn test_policy_table_from_map_requires_default() {
    let mut map = HashMap::new();
    map.insert("auth/login".to_string(), EndpointPolicy::new(300_000, 10));

    let result = PolicyTable::from_map(map);
    assert!(matches!(result, Err(CoreError::Validation(_))));
}

#[test]
fn test_policy_table_from_map_rejects_zero_window() {
    let mut map = HashMap::new();
    map.insert(DEFAULT_POLICY.to_string(), EndpointPolicy::new(60_000, 100));
    map.insert("ai/generate".to_string(), EndpointPolicy::new(0, 10));

    assert!(PolicyTable::from_map(map).is_err());
}

#[test_case(MAX_WINDOW_MS + 1 ; "just over a year")]
#[test_case(1 << 62 ; "beyond date range")]
#[test_case(u64::MAX ; "beyond i64")]
fn test_policy_table_from_map_rejects_oversized_window(window_ms: u64) {
    let mut map = HashMap::new();
    map.insert(DEFAULT_POLICY.to_string(), EndpointPolicy::new(window_ms, 5));

    let result = PolicyTable::from_map(map);
    assert!(matches!(result, Err(CoreError::Validation(_))));
}

#[test]
fn test_policy_table_accepts_maximum_window() {
    let mut map = HashMap::new();
    map.insert(DEFAULT_POLICY.to_string(), EndpointPolicy::new(MAX_WINDOW_MS, 5));

    assert!(PolicyTable::from_map(map).is_ok());
}

#[test]
fn test_policy_table_from_map() {
    let mut map = HashMap::new();
    map.insert(DEFAULT_POLICY.to_string(), EndpointPolicy::new(1_000, 5));
    map.insert("feedback".to_string(), EndpointPolicy::new(2_000, 1));

    let table = PolicyTable::from_map(map).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.default_policy(), EndpointPolicy::new(1_000, 5));
    assert_eq!(table.lookup("feedback").max_requests, 1);
}

#[test]
fn test_standard_table_login_policy() {
    let table = PolicyTable::standard();
    assert_eq!(table.lookup("auth/login"), EndpointPolicy::new(300_000, 10));
    assert_eq!(table.lookup("nope"), table.default_policy());
}

// ===== Event Taxonomy Tests =====

#[test_case(SecurityEventKind::AuthFailure { reason: "bad password".into() }, EventType::AuthFailure, Severity::Medium)]
#[test_case(SecurityEventKind::AuthSuccess, EventType::AuthSuccess, Severity::Low)]
#[test_case(SecurityEventKind::RateLimitExceeded { limit: 10, retry_after: 5 }, EventType::RateLimitExceeded, Severity::Medium)]
#[test_case(SecurityEventKind::InvalidInput { field: "email".into(), reason: "format".into() }, EventType::InvalidInput, Severity::Low)]
#[test_case(SecurityEventKind::UnauthorizedAccess { resource: "admin".into() }, EventType::UnauthorizedAccess, Severity::High)]
#[test_case(SecurityEventKind::AdminAccess { action: "export".into() }, EventType::AdminAccess, Severity::Low)]
#[test_case(SecurityEventKind::SuspiciousActivity { reason: "csrf".into(), details: json!({}) }, EventType::SuspiciousActivity, Severity::High)]
#[test_case(SecurityEventKind::CspViolation { report: json!({}) }, EventType::CspViolation, Severity::Medium)]
#[test_case(SecurityEventKind::ApiError { message: "boom".into() }, EventType::ApiError, Severity::Medium)]
#[test_case(SecurityEventKind::ValidationFailure { field: "topic".into(), reason: "too long".into() }, EventType::ValidationFailure, Severity::Low)]
fn test_kind_fixes_type_and_severity(kind: SecurityEventKind, event_type: EventType, severity: Severity) {
    let event = SecurityEvent::new(kind, Utc::now());
    assert_eq!(event.event_type, event_type);
    assert_eq!(event.severity, severity);
}

#[test]
fn test_event_type_serialization() {
    let json = serde_json::to_string(&EventType::RateLimitExceeded).unwrap();
    assert_eq!(json, "\"rate_limit_exceeded\"");
    assert_eq!(EventType::SuspiciousActivity.to_string(), "suspicious_activity");

    let json = serde_json::to_string(&Severity::Critical).unwrap();
    assert_eq!(json, "\"critical\"");
}

#[test]
fn test_severity_ordering() {
    assert!(Severity::Low < Severity::Medium);
    assert!(Severity::High < Severity::Critical);
    assert!(Severity::High.is_urgent());
    assert!(!Severity::Medium.is_urgent());
}

#[test]
fn test_event_with_context() {
    let ctx = RequestContext::new("auth/login", "POST")
        .with_actor(ActorId::new("user-1"), Some("a@b.com".to_string()))
        .with_origin("203.0.113.9")
        .with_user_agent("curl/8.0");

    let event = SecurityEvent::new(SecurityEventKind::AuthSuccess, Utc::now())
        .with_context(&ctx)
        .with_status(200);

    assert_eq!(event.actor_id, Some(ActorId::new("user-1")));
    assert_eq!(event.actor_email.as_deref(), Some("a@b.com"));
    assert_eq!(event.origin.as_deref(), Some("203.0.113.9"));
    assert_eq!(event.endpoint.as_deref(), Some("auth/login"));
    assert_eq!(event.method.as_deref(), Some("POST"));
    assert_eq!(event.status_code, Some(200));
}

#[test]
fn test_suspicious_activity_details_merge_reason() {
    let kind = SecurityEventKind::SuspiciousActivity {
        reason: "csrf_validation_failed".into(),
        details: json!({ "headerTokenPresent": false }),
    };

    assert_eq!(
        kind.details(),
        json!({ "reason": "csrf_validation_failed", "headerTokenPresent": false })
    );
}

// ===== Detail Sanitization Tests =====

#[test]
fn test_sanitize_redacts_secret_values() {
    let details = sanitize_details(json!({
        "csrfToken": "abcdef",
        "password": "hunter2",
        "nested": { "authorization": "Bearer xyz", "ok": "kept" },
        "headerTokenPresent": true,
    }));

    assert_eq!(
        details,
        json!({
            "csrfToken": "[redacted]",
            "password": "[redacted]",
            "nested": { "authorization": "[redacted]", "ok": "kept" },
            "headerTokenPresent": true,
        })
    );
}

#[test]
fn test_sanitize_labels_oversized_values() {
    let long = "x".repeat(MAX_DETAIL_STRING_LEN + 1);
    let many: Vec<u32> = (0..(MAX_DETAIL_ARRAY_LEN as u32 + 5)).collect();

    let details = sanitize_details(json!({ "payload": long, "items": many }));

    assert_eq!(
        details,
        json!({
            "payload": format!("[string of length {}]", MAX_DETAIL_STRING_LEN + 1),
            "items": format!("[array of length {}]", MAX_DETAIL_ARRAY_LEN + 5),
        })
    );
}

// ===== RequestContext Tests =====

#[test]
fn test_rate_limit_identifier_prefers_actor() {
    let anonymous = RequestContext::new("feedback", "POST").with_origin("198.51.100.7");
    assert_eq!(anonymous.rate_limit_identifier(), "ip:198.51.100.7");

    let authenticated = anonymous.with_actor(ActorId::new("u-42"), None);
    assert_eq!(authenticated.rate_limit_identifier(), "user:u-42");
}

#[test]
fn test_request_context_defaults_to_unknown_origin() {
    let ctx = RequestContext::new("feedback", "GET");
    assert_eq!(ctx.origin, UNKNOWN_ORIGIN);
}

// ===== ValidationResult Tests =====

#[test]
fn test_validation_result_and_then() {
    let chained = ValidationResult::ok("far").and_then(|v| ValidationResult::ok(v.to_uppercase()));
    assert_eq!(chained.sanitized.as_deref(), Some("FAR"));

    let short_circuit = ValidationResult::invalid("empty")
        .and_then(|_| panic!("must not run after a failure"));
    assert!(!short_circuit.is_valid());
}

#[test]
fn test_validation_result_serialization() {
    let json = serde_json::to_value(ValidationResult::invalid("Too long")).unwrap();
    assert_eq!(json, json!({ "valid": false, "error": "Too long" }));

    let json = serde_json::to_value(ValidationResult::adversarial("Invalid input")).unwrap();
    assert_eq!(json["adversarial"], json!(true));
}

// ===== Clock Tests =====

#[test]
fn test_manual_clock_advances() {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(start);

    clock.advance(Duration::seconds(90));
    assert_eq!(clock.now(), start + Duration::seconds(90));

    clock.set(start);
    assert_eq!(clock.now(), start);
}
