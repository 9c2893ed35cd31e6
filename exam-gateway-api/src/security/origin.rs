//! Request context extraction: actor, network origin, user agent, endpoint.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, Request},
};
use exam_gateway_core::{ActorId, RequestContext, UNKNOWN_ORIGIN};
use std::convert::Infallible;
use std::net::IpAddr;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";
pub const PLATFORM_FORWARDED_FOR_HEADER: &str = "x-vercel-forwarded-for";

/// Authenticated caller, inserted as a request extension by the auth layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedActor {
    pub id: ActorId,
    pub email: Option<String>,
}

/// Client origin from proxy headers, in priority order.
///
/// Only the first segment of each header is considered and it must parse as
/// an IP address; anything else falls through to the next header and finally
/// to `"unknown"`.
pub fn client_origin(headers: &HeaderMap) -> String {
    [
        FORWARDED_FOR_HEADER,
        REAL_IP_HEADER,
        PLATFORM_FORWARDED_FOR_HEADER,
    ]
    .iter()
    .find_map(|name| first_ip(headers, name))
    .map(|ip| ip.to_string())
    .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
}

fn first_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

/// Logical endpoint name for a request path: `/api/auth/login` → `auth/login`.
pub fn endpoint_name(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    trimmed
        .strip_prefix("api/")
        .or_else(|| (trimmed == "api").then_some(""))
        .unwrap_or(trimmed)
        .to_string()
}

fn context_from(headers: &HeaderMap, path: &str, method: &str, actor: Option<&AuthenticatedActor>) -> RequestContext {
    let mut ctx = RequestContext::new(endpoint_name(path), method).with_origin(client_origin(headers));

    if let Some(ua) = user_agent(headers) {
        ctx = ctx.with_user_agent(ua);
    }
    if let Some(actor) = actor {
        ctx = ctx.with_actor(actor.id.clone(), actor.email.clone());
    }
    ctx
}

/// Build the shared request context from a full request
pub fn request_context<B>(req: &Request<B>) -> RequestContext {
    context_from(
        req.headers(),
        req.uri().path(),
        req.method().as_str(),
        req.extensions().get::<AuthenticatedActor>(),
    )
}

/// Extractor handing the request context to handlers
#[derive(Debug, Clone)]
pub struct SecurityContext(pub RequestContext);

#[async_trait]
impl<S> FromRequestParts<S> for SecurityContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SecurityContext(context_from(
            &parts.headers,
            parts.uri.path(),
            parts.method.as_str(),
            parts.extensions.get::<AuthenticatedActor>(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_forwarded_for_first_segment_wins() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.5, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_origin(&h), "203.0.113.5");
    }

    #[test]
    fn test_real_ip_then_platform_header() {
        let h = headers(&[("x-real-ip", "198.51.100.2"), ("x-vercel-forwarded-for", "192.0.2.1")]);
        assert_eq!(client_origin(&h), "198.51.100.2");

        let h = headers(&[("x-vercel-forwarded-for", "192.0.2.1")]);
        assert_eq!(client_origin(&h), "192.0.2.1");
    }

    #[test]
    fn test_garbage_header_falls_through() {
        let h = headers(&[("x-forwarded-for", "not-an-ip"), ("x-real-ip", "2001:db8::1")]);
        assert_eq!(client_origin(&h), "2001:db8::1");
    }

    #[test]
    fn test_unknown_when_no_headers() {
        assert_eq!(client_origin(&HeaderMap::new()), UNKNOWN_ORIGIN);
    }

    #[test]
    fn test_endpoint_name() {
        assert_eq!(endpoint_name("/api/auth/login"), "auth/login");
        assert_eq!(endpoint_name("/feedback/"), "feedback");
        assert_eq!(endpoint_name("/api"), "");
        assert_eq!(endpoint_name("/apiary"), "apiary");
    }

    #[test]
    fn test_request_context_with_actor() {
        let mut req = Request::builder()
            .method("POST")
            .uri("/api/feedback")
            .header("x-real-ip", "198.51.100.2")
            .header("user-agent", "test-agent")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(AuthenticatedActor {
            id: ActorId::new("u-1"),
            email: Some("u1@example.com".to_string()),
        });

        let ctx = request_context(&req);
        assert_eq!(ctx.endpoint, "feedback");
        assert_eq!(ctx.method, "POST");
        assert_eq!(ctx.origin, "198.51.100.2");
        assert_eq!(ctx.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(ctx.rate_limit_identifier(), "user:u-1");
    }
}
