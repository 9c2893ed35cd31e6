//! HTTP surface of the exam gateway: the security middleware stack and the
//! routes it protects.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod security;

use axum::{
    routing::{get, post},
    Router,
};

pub use error::{ApiError, ApiResult};
pub use security::{with_security, SecurityGateway};

/// API routes, wrapped in CSRF validation and rate limiting.
///
/// Intended to be nested under `/api`.
pub fn routes(gateway: SecurityGateway) -> Router {
    let router = Router::new()
        .route("/csrf-token", get(handlers::csrf::issue_token))
        .route("/feedback", post(handlers::feedback::submit));

    with_security(router, gateway)
}
