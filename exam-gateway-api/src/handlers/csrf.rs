use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};

use crate::{dto::CsrfTokenResponse, security::CsrfGuard, SecurityGateway};

/// Hand out the caller's CSRF token, setting the cookie when it is new.
pub async fn issue_token(State(gateway): State<SecurityGateway>, headers: HeaderMap) -> Response {
    let existing = CsrfGuard::cookie_token(&headers);
    let issued = gateway.csrf.issue(existing.as_deref());

    let mut response = Json(CsrfTokenResponse {
        csrf_token: issued.token.clone(),
    })
    .into_response();

    let response_headers = response.headers_mut();
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if issued.fresh {
        if let Ok(cookie) = HeaderValue::from_str(&gateway.csrf.set_cookie_value(&issued.token)) {
            response_headers.insert(header::SET_COOKIE, cookie);
        }
    }

    response
}
