use axum::body::Body;
use axum::extract::{MatchedPath, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::debug;

use crate::application::auth::{AuthError, Principal};

use super::error::{ApiError, codes};
use super::rate_limit::RateDecision;
use super::state::ApiState;

const UNVERIFIED_CALLER: &str = "unverified";
const MAX_PREFIX_LEN: usize = 32;

/// Admits admin requests carrying a valid API key.
pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = credential(request.headers()) else {
        return ApiError::unauthorized().into_response();
    };

    let principal = match state.auth.verify(&token).await {
        Ok(principal) => principal,
        Err(err) => return auth_error_to_api(err).into_response(),
    };

    request.extensions_mut().insert(principal.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    response
}

pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let caller = match request.extensions().get::<Principal>() {
        Some(principal) => principal.key_id.to_string(),
        // Render requests are authenticated inside the pipeline.
        None => unverified_caller(request.headers()),
    };

    if let RateDecision::Limited = state.rate_limiter.check(&caller, &route) {
        counter!("stampa_rate_limited_total").increment(1);
        debug!(
            target = "stampa::api::ratelimit",
            caller = %caller,
            route = %route,
            "Request rate limited"
        );
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs());
    }

    next.run(request).await
}

/// Bearer token from `Authorization`, falling back to `x-api-key`.
pub fn credential(headers: &HeaderMap) -> Option<String> {
    extract_bearer(headers.get(axum::http::header::AUTHORIZATION)).or_else(|| {
        headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
    })
}

pub fn auth_error_to_api(err: AuthError) -> ApiError {
    match err {
        AuthError::Missing | AuthError::Invalid => ApiError::unauthorized(),
        AuthError::Expired => {
            ApiError::new(StatusCode::UNAUTHORIZED, "expired", "API key expired", None)
        }
        AuthError::Revoked => {
            ApiError::new(StatusCode::UNAUTHORIZED, "revoked", "API key revoked", None)
        }
        AuthError::Forbidden(action) => ApiError::forbidden(Some(action)),
        AuthError::Unavailable => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::AUTH_UNAVAILABLE,
            "Credential store unavailable",
            None,
        ),
    }
}

fn extract_bearer(header: Option<&axum::http::HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?.trim();
    (!bearer.is_empty()).then(|| bearer.to_string())
}

/// Bucket for a caller whose credential has not been verified yet.
///
/// Well-formed keys are bucketed by their public `sk_<prefix>` part; anything
/// else shares one bucket.
fn unverified_caller(headers: &HeaderMap) -> String {
    credential(headers)
        .as_deref()
        .and_then(credential_prefix)
        .unwrap_or(UNVERIFIED_CALLER)
        .to_string()
}

fn credential_prefix(token: &str) -> Option<&str> {
    let (tag, rest) = token.split_once('_')?;
    let (prefix, _secret) = rest.split_once('_')?;
    let well_formed = tag == "sk"
        && !prefix.is_empty()
        && prefix.len() <= MAX_PREFIX_LEN
        && prefix.bytes().all(|b| b.is_ascii_alphanumeric());
    well_formed.then(|| &token[..tag.len() + 1 + prefix.len()])
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_header_wins_over_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("sk_b_secret"));
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer sk_a_secret"),
        );
        assert_eq!(credential(&headers).as_deref(), Some("sk_a_secret"));

        headers.remove(axum::http::header::AUTHORIZATION);
        assert_eq!(credential(&headers).as_deref(), Some("sk_b_secret"));
    }

    #[test]
    fn blank_credentials_are_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer   "),
        );
        assert_eq!(credential(&headers), None);
    }

    #[test]
    fn rate_limit_bucket_uses_prefix_only() {
        assert_eq!(credential_prefix("sk_abc123_topsecret"), Some("sk_abc123"));
        assert_eq!(credential_prefix("opaque"), None);
        assert_eq!(credential_prefix("pk_abc123_topsecret"), None);
        assert_eq!(credential_prefix(&format!("sk_{}_x", "a".repeat(64))), None);
    }

    #[test]
    fn malformed_credentials_share_one_bucket() {
        let mut first = HeaderMap::new();
        first.insert("x-api-key", HeaderValue::from_static("random-1"));
        let mut second = HeaderMap::new();
        second.insert("x-api-key", HeaderValue::from_static("random-2"));

        assert_eq!(unverified_caller(&first), UNVERIFIED_CALLER);
        assert_eq!(unverified_caller(&second), UNVERIFIED_CALLER);
        assert_eq!(unverified_caller(&HeaderMap::new()), UNVERIFIED_CALLER);
    }
}
