//! Actor identification.
//!
//! Authentication happens upstream; the proxy forwards the authenticated
//! user id in the `x-user-id` header. This middleware turns that header into
//! an [`Actor`] request extension and records the user's activity.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use parley_shared::constants::ACTOR_HEADER;
use parley_shared::types::UserId;
use tracing::warn;

use crate::api::AppState;
use crate::error::ServerError;

/// The user performing the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub UserId);

pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<UserId, ServerError> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<UserId>().ok())
        .ok_or(ServerError::Unauthenticated)
}

/// Axum middleware resolving the [`Actor`] of every protected route.
///
/// A request without a usable header is rejected with 401 before it reaches
/// any handler.
pub async fn actor_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let user = actor_from_headers(req.headers())?;

    // Unknown users are simply not recorded; the profile endpoint creates them.
    if let Err(e) = state.engine.touch_user(user).await {
        warn!(user = %user, error = %e, "failed to record user activity");
    }

    req.extensions_mut().insert(Actor(user));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn header_is_parsed() {
        let mut headers = HeaderMap::new();
        assert!(matches!(actor_from_headers(&headers), Err(ServerError::Unauthenticated)));

        headers.insert(ACTOR_HEADER, HeaderValue::from_static("alice"));
        assert!(actor_from_headers(&headers).is_err());

        headers.insert(ACTOR_HEADER, HeaderValue::from_static(" 42 "));
        assert_eq!(actor_from_headers(&headers).unwrap(), UserId(42));
    }
}
