//! Request security gateway
//!
//! Four cooperating utilities guarding state-changing API requests:
//! - CSRF protection (double-submit cookie)
//! - Fixed-window rate limiting per identifier and endpoint
//! - Field validation, adversarial-pattern detection and HTML escaping
//! - Security event logging (best-effort, never blocks the caller)
//!
//! For an unsafe request the checks run CSRF → rate limit → field
//! validation. The first rejection ends the chain and emits one event.

pub mod origin;
pub mod rate_limit;
pub mod csrf;
pub mod validation;
pub mod events;
pub mod gateway;

pub use origin::{
    client_origin, endpoint_name, request_context, user_agent, AuthenticatedActor,
    SecurityContext, FORWARDED_FOR_HEADER, PLATFORM_FORWARDED_FOR_HEADER, REAL_IP_HEADER,
};
pub use rate_limit::{
    add_rate_limit_headers, rate_limit_middleware, FixedWindowRateLimiter, RateLimitError,
};
pub use csrf::{
    constant_time_eq, csrf_middleware, CsrfConfig, CsrfError, CsrfGuard, IssuedToken,
    CSRF_COOKIE_NAME, CSRF_HEADER_NAME, CSRF_MAX_AGE_SECS, CSRF_TOKEN_BYTES,
};
pub use validation::{
    detect_adversarial, sanitize, validate_email, validate_field, validate_length,
    validate_no_threats, validate_positive_int, validate_positive_int_value, validate_required,
    validate_required_field, validate_section, validate_uuid, FieldKind, InputValidator,
    JsonBody, ThreatPattern, SECTIONS,
};
pub use events::{SecurityEventLog, TracingEventSink, DEFAULT_QUEUE_CAPACITY};
pub use gateway::{with_security, SecurityGateway};
