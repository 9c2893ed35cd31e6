use axum::{middleware, Router};
use std::sync::Arc;

use super::csrf::{csrf_middleware, CsrfGuard};
use super::events::SecurityEventLog;
use super::rate_limit::{rate_limit_middleware, FixedWindowRateLimiter};
use super::validation::InputValidator;

/// Shared state for the security middleware and extractors
#[derive(Clone)]
pub struct SecurityGateway {
    pub csrf: Arc<CsrfGuard>,
    pub limiter: Arc<FixedWindowRateLimiter>,
    pub events: SecurityEventLog,
    pub validator: InputValidator,
}

impl SecurityGateway {
    pub fn new(limiter: FixedWindowRateLimiter, csrf: CsrfGuard, events: SecurityEventLog) -> Self {
        Self {
            csrf: Arc::new(csrf),
            limiter: Arc::new(limiter),
            validator: InputValidator::new(events.clone()),
            events,
        }
    }
}

/// Wrap `router` with CSRF validation followed by rate limiting.
///
/// Layers run outermost-first, so the CSRF layer is added last.
pub fn with_security(router: Router<SecurityGateway>, gateway: SecurityGateway) -> Router {
    router
        .layer(middleware::from_fn_with_state(
            gateway.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(gateway.clone(), csrf_middleware))
        .with_state(gateway)
}
