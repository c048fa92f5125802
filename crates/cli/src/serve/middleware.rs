//! Request middleware for `circuit serve`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::state::AppState;

/// Liveness probes must never be throttled.
fn is_exempt(method: &Method, path: &str) -> bool {
    method == Method::GET && path == "/health"
}

/// 429 with the seconds left in the client's window, both in the body and in
/// `Retry-After`.
fn too_many_requests(retry_after: u64) -> Response {
    let body = serde_json::json!({
        "error": "rate limit exceeded",
        "kind": "rate_limit",
        "retry_after": retry_after,
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// Per-client-IP throttle, applied before routing.
pub(crate) async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if is_exempt(request.method(), request.uri().path()) {
        return next.run(request).await;
    }
    let ip = addr.ip();
    if let Err(retry_after) = state.rate_limiter.check(ip).await {
        tracing::debug!(%ip, path = %request.uri().path(), retry_after, "request throttled");
        return too_many_requests(retry_after);
    }
    next.run(request).await
}

/// One `debug` line per request with its outcome and latency. Server errors
/// are raised to `warn`.
pub(crate) async fn log_requests(request: Request<axum::body::Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        tracing::warn!(%method, path = %path, status, elapsed_ms, "request failed");
    } else {
        tracing::debug!(%method, path = %path, status, elapsed_ms, "request handled");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_health_checks_skip_the_limit() {
        assert!(is_exempt(&Method::GET, "/health"));
        assert!(!is_exempt(&Method::POST, "/health"));
        assert!(!is_exempt(&Method::GET, "/circuits"));
        assert!(!is_exempt(&Method::POST, "/documents/doc-1/process"));
    }

    #[test]
    fn throttled_response_carries_retry_after() {
        let response = too_many_requests(42);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from(42u64))
        );
    }
}
