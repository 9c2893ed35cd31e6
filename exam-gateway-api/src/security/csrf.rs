//! CSRF protection using the double-submit cookie pattern
//!
//! The token lives in a script-readable cookie and the client echoes it in
//! the `x-csrf-token` header on every state-changing request. There is no
//! server-side token table: the cookie is the state.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use exam_gateway_core::SecurityEventKind;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use super::gateway::SecurityGateway;
use super::origin::request_context;
use crate::observability::metrics::SecurityMetrics;

pub const CSRF_COOKIE_NAME: &str = "csrf_token";
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";
pub const CSRF_TOKEN_BYTES: usize = 32;
/// Cookie lifetime: 24 hours
pub const CSRF_MAX_AGE_SECS: u64 = 86_400;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// Adds the `Secure` attribute to the cookie
    pub secure_cookie: bool,
}

impl CsrfConfig {
    /// Secure cookies in production, plain cookies everywhere else.
    pub fn for_environment(environment: &str) -> Self {
        Self {
            secure_cookie: environment.eq_ignore_ascii_case("production"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsrfError {
    #[error("CSRF token missing")]
    Missing,

    #[error("CSRF token mismatch")]
    Mismatch,
}

impl IntoResponse for CsrfError {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Invalid CSRF token" })),
        )
            .into_response()
    }
}

/// Token handed to a client; `fresh` means the cookie must be (re)set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub fresh: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CsrfGuard {
    config: CsrfConfig,
}

impl CsrfGuard {
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }

    /// 32 random bytes, hex-encoded
    pub fn generate_token() -> String {
        let mut bytes = [0u8; CSRF_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Reuse the caller's cookie token when it is well-formed, otherwise mint one.
    pub fn issue(&self, existing: Option<&str>) -> IssuedToken {
        match existing.filter(|token| is_well_formed(token)) {
            Some(token) => IssuedToken {
                token: token.to_string(),
                fresh: false,
            },
            None => IssuedToken {
                token: Self::generate_token(),
                fresh: true,
            },
        }
    }

    /// Both tokens must be present and byte-equal.
    pub fn validate(&self, header_token: Option<&str>, cookie_token: Option<&str>) -> Result<(), CsrfError> {
        match (header_token, cookie_token) {
            (Some(header), Some(cookie)) => {
                if constant_time_eq(header.as_bytes(), cookie.as_bytes()) {
                    Ok(())
                } else {
                    Err(CsrfError::Mismatch)
                }
            }
            _ => Err(CsrfError::Missing),
        }
    }

    /// Check a request. Safe methods always pass.
    pub fn protect<B>(&self, req: &Request<B>) -> Result<(), CsrfError> {
        if is_safe_method(req.method()) {
            return Ok(());
        }

        let headers = req.headers();
        self.validate(
            Self::header_token(headers).as_deref(),
            Self::cookie_token(headers).as_deref(),
        )
    }

    pub fn header_token(headers: &HeaderMap) -> Option<String> {
        headers
            .get(CSRF_HEADER_NAME)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }

    pub fn cookie_token(headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == CSRF_COOKIE_NAME)
            .map(|(_, token)| token.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }

    /// `Set-Cookie` value for `token`. Not HttpOnly: client script must read it.
    pub fn set_cookie_value(&self, token: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Strict",
            CSRF_COOKIE_NAME, token, CSRF_MAX_AGE_SECS
        );
        if self.config.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn is_well_formed(token: &str) -> bool {
    token.len() == CSRF_TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Compare without short-circuiting on the first differing byte.
///
/// Tokens have a fixed length, so a length mismatch returns early.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Axum middleware rejecting unsafe requests without a matching token pair
pub async fn csrf_middleware(
    State(gateway): State<SecurityGateway>,
    req: Request,
    next: Next,
) -> Response {
    if let Err(err) = gateway.csrf.protect(&req) {
        let ctx = request_context(&req);
        let headers = req.headers();

        SecurityMetrics::record_csrf_rejection();
        gateway.events.record(
            SecurityEventKind::SuspiciousActivity {
                reason: "csrf_validation_failed".to_string(),
                details: json!({
                    "headerTokenPresent": CsrfGuard::header_token(headers).is_some(),
                    "cookieTokenPresent": CsrfGuard::cookie_token(headers).is_some(),
                    "method": ctx.method.clone(),
                }),
            },
            &ctx,
            Some(StatusCode::FORBIDDEN.as_u16()),
        );

        return err.into_response();
    }

    next.run(req).await
}
