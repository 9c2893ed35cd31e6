//! Field validation, adversarial-pattern detection and HTML escaping
//!
//! Every validator returns a [`ValidationResult`] carrying the normalized
//! value on success. Callers turn failures into responses through
//! [`InputValidator::check`], which logs the matching security event and
//! always answers with the same generic message.

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use exam_gateway_core::{RequestContext, SecurityEventKind, ValidationResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use uuid::{Uuid, Variant};
use validator::ValidateEmail;

use super::events::SecurityEventLog;
use super::gateway::SecurityGateway;
use super::origin::request_context;
use crate::error::ApiError;
use crate::observability::metrics::SecurityMetrics;

/// Exam section codes accepted by [`validate_section`]
pub const SECTIONS: [&str; 6] = ["FAR", "AUD", "REG", "BAR", "ISC", "TCP"];

/// Semantic field categories, each with its own maximum length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Comment,
    Notes,
    Email,
    Name,
    Id,
    Topic,
    Subject,
    Body,
    Url,
    SearchQuery,
}

impl FieldKind {
    /// Maximum length in characters
    pub const fn max_length(self) -> usize {
        match self {
            FieldKind::Comment => 1000,
            FieldKind::Notes => 5000,
            FieldKind::Email => 254,
            FieldKind::Name => 100,
            FieldKind::Id => 128,
            FieldKind::Topic => 200,
            FieldKind::Subject => 200,
            FieldKind::Body => 10_000,
            FieldKind::Url => 2048,
            FieldKind::SearchQuery => 200,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            FieldKind::Comment => "comment",
            FieldKind::Notes => "notes",
            FieldKind::Email => "email",
            FieldKind::Name => "name",
            FieldKind::Id => "id",
            FieldKind::Topic => "topic",
            FieldKind::Subject => "subject",
            FieldKind::Body => "body",
            FieldKind::Url => "url",
            FieldKind::SearchQuery => "search query",
        }
    }
}

/// Trimmed value no longer than the field's maximum.
pub fn validate_length(value: &str, kind: FieldKind) -> ValidationResult {
    let trimmed = value.trim();
    let length = trimmed.chars().count();

    if length > kind.max_length() {
        ValidationResult::invalid(format!(
            "{} exceeds {} characters (got {})",
            kind.name(),
            kind.max_length(),
            length
        ))
    } else {
        ValidationResult::ok(trimmed)
    }
}

/// Rejects a missing or blank value, then applies [`validate_length`].
pub fn validate_required(value: Option<&str>, kind: FieldKind) -> ValidationResult {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => validate_length(v, kind),
        _ => ValidationResult::invalid(format!("{} is required", kind.name())),
    }
}

/// Presence check followed by [`validate_field`], so threats are reported
/// ahead of length or shape problems.
pub fn validate_required_field(value: Option<&str>, kind: FieldKind) -> ValidationResult {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => validate_field(v, kind),
        None => ValidationResult::invalid(format!("{} is required", kind.name())),
    }
}

/// Case-insensitive membership in [`SECTIONS`]; normalizes to upper case.
pub fn validate_section(value: &str) -> ValidationResult {
    let normalized = value.trim().to_ascii_uppercase();
    if SECTIONS.contains(&normalized.as_str()) {
        ValidationResult::ok(normalized)
    } else {
        ValidationResult::invalid("unknown section")
    }
}

/// RFC 4122 UUID in hyphenated form, versions 1 through 5; normalizes to lower case.
pub fn validate_uuid(value: &str) -> ValidationResult {
    let trimmed = value.trim();
    let hyphenated = trimmed.len() == 36
        && trimmed
            .char_indices()
            .all(|(i, c)| matches!(i, 8 | 13 | 18 | 23) == (c == '-'));

    match Uuid::try_parse(trimmed) {
        Ok(uuid)
            if hyphenated
                && uuid.get_variant() == Variant::RFC4122
                && (1..=5).contains(&uuid.get_version_num()) =>
        {
            ValidationResult::ok(uuid.hyphenated().to_string())
        }
        _ => ValidationResult::invalid("invalid UUID"),
    }
}

/// Non-negative integer with an optional inclusive upper bound.
pub fn validate_positive_int(value: &str, max: Option<u64>) -> ValidationResult {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return ValidationResult::invalid("must be a non-negative integer");
    }

    match trimmed.parse::<u64>() {
        Ok(n) => check_upper_bound(n, max),
        Err(_) => ValidationResult::invalid("integer out of range"),
    }
}

/// Same as [`validate_positive_int`] for a JSON number or numeric string.
pub fn validate_positive_int_value(value: &Value, max: Option<u64>) -> ValidationResult {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(n) => check_upper_bound(n, max),
            None => ValidationResult::invalid("must be a non-negative integer"),
        },
        Value::String(s) => validate_positive_int(s, max),
        _ => ValidationResult::invalid("must be a non-negative integer"),
    }
}

fn check_upper_bound(n: u64, max: Option<u64>) -> ValidationResult {
    match max {
        Some(max) if n > max => ValidationResult::invalid(format!("must be at most {max}")),
        _ => ValidationResult::ok(n.to_string()),
    }
}

/// Syntactic address check plus the email length limit; normalizes to lower case.
pub fn validate_email(value: &str) -> ValidationResult {
    let normalized = value.trim().to_lowercase();

    if normalized.is_empty() {
        return ValidationResult::invalid("email is required");
    }
    if normalized.chars().count() > FieldKind::Email.max_length() {
        return ValidationResult::invalid("email too long");
    }
    if !normalized.validate_email() {
        return ValidationResult::invalid("invalid email");
    }
    ValidationResult::ok(normalized)
}

/// One adversarial signature
#[derive(Debug)]
pub struct ThreatPattern {
    pub name: &'static str,
    regex: Regex,
}

impl ThreatPattern {
    fn new(name: &'static str, pattern: &str) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(regex) => Some(Self { name, regex }),
            Err(e) => {
                tracing::error!(pattern = name, error = %e, "Skipping invalid threat pattern");
                None
            }
        }
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

static THREAT_PATTERNS: Lazy<Vec<ThreatPattern>> = Lazy::new(|| {
    [
        ThreatPattern::new("script_tag", r"(?i)<\s*/?\s*script"),
        ThreatPattern::new(
            "event_handler",
            r"(?i)\bon(?:abort|blur|change|click|dblclick|error|focus|input|keydown|keypress|keyup|load|mousedown|mousemove|mouseout|mouseover|mouseup|reset|resize|scroll|select|submit|unload)\s*=",
        ),
        ThreatPattern::new("javascript_uri", r"(?i)javascript\s*:"),
        ThreatPattern::new("sql_union_select", r"(?i)\bunion\s+(?:all\s+)?select\b"),
        ThreatPattern::new("sql_drop_table", r"(?i)\bdrop\s+table\b"),
        ThreatPattern::new(
            "sql_tautology",
            r"(?i)'\s*or\s+'?\w+'?\s*=\s*'?\w+|\bor\s+1\s*=\s*1\b",
        ),
        ThreatPattern::new("path_traversal", r"(?i)\.\./|\.\.\\|%2e%2e"),
        ThreatPattern::new("null_byte", r"\x00|%00"),
    ]
    .into_iter()
    .flatten()
    .collect()
});

/// Name of the first adversarial signature `value` matches.
pub fn detect_adversarial(value: &str) -> Option<&'static str> {
    THREAT_PATTERNS
        .iter()
        .find(|pattern| pattern.is_match(value))
        .map(|pattern| pattern.name)
}

pub fn validate_no_threats(value: &str) -> ValidationResult {
    match detect_adversarial(value) {
        Some(name) => ValidationResult::adversarial(name),
        None => ValidationResult::ok(value),
    }
}

/// Threat check followed by the field's own shape check.
pub fn validate_field(value: &str, kind: FieldKind) -> ValidationResult {
    validate_no_threats(value).and_then(|v| match kind {
        FieldKind::Email => validate_email(v),
        FieldKind::Id => validate_length(v, kind).and_then(|id| {
            if id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                ValidationResult::ok(id)
            } else {
                ValidationResult::invalid("invalid id")
            }
        }),
        _ => validate_length(v, kind),
    })
}

/// Escape `< > " ' /` for display outside a trusted template. `&` is left alone.
pub fn sanitize(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Turns validator results into responses and security events
#[derive(Clone)]
pub struct InputValidator {
    events: SecurityEventLog,
}

impl InputValidator {
    pub fn new(events: SecurityEventLog) -> Self {
        Self { events }
    }

    /// The normalized value, or a generic 400 after logging why.
    ///
    /// Adversarial matches are logged as `suspicious_activity`, malformed
    /// values as `validation_failure`.
    pub fn check(
        &self,
        ctx: &RequestContext,
        field: &str,
        result: ValidationResult,
    ) -> Result<String, ApiError> {
        if result.valid {
            return Ok(result.sanitized.unwrap_or_default());
        }

        let reason = result.error.unwrap_or_else(|| "invalid".to_string());
        SecurityMetrics::record_validation_failure(result.adversarial);

        let kind = if result.adversarial {
            SecurityEventKind::SuspiciousActivity {
                reason: "adversarial_input".to_string(),
                details: json!({ "field": field, "pattern": reason }),
            }
        } else {
            SecurityEventKind::ValidationFailure {
                field: field.to_string(),
                reason: reason.clone(),
            }
        };
        self.events.record(kind, ctx, Some(400));

        Err(ApiError::Validation(format!("{field}: {reason}")))
    }

    /// Like [`check`](Self::check) for an optional field: absent or blank is `Ok(None)`.
    pub fn check_optional(
        &self,
        ctx: &RequestContext,
        field: &str,
        value: Option<&str>,
        validate: impl FnOnce(&str) -> ValidationResult,
    ) -> Result<Option<String>, ApiError> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => self.check(ctx, field, validate(v)).map(Some),
            None => Ok(None),
        }
    }
}

/// JSON body extractor that logs unparseable payloads as `invalid_input`
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T> FromRequest<SecurityGateway> for JsonBody<T>
where
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &SecurityGateway) -> Result<Self, Self::Rejection> {
        let ctx = request_context(&req);

        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => {
                let reason = rejection.body_text();
                SecurityMetrics::record_validation_failure(false);
                state.events.record(
                    SecurityEventKind::InvalidInput {
                        field: "body".to_string(),
                        reason: reason.clone(),
                    },
                    &ctx,
                    Some(rejection.status().as_u16()),
                );
                Err(ApiError::BadRequest(reason))
            }
        }
    }
}
