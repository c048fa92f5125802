//! `circuit serve`: HTTP JSON API over the workflow engine.
//!
//! Exposes every workflow operation as an async HTTP service using `axum` +
//! `tokio`. Operations on different documents run concurrently; operations
//! on one document are serialized by the engine.
//!
//! Endpoints:
//! - GET  /health                               - Server status
//! - GET  /circuits                             - Loaded circuits and actions
//! - POST /documents                            - Register a document
//! - POST /documents/{id}/assign                - Assign a circuit
//! - POST /documents/{id}/process               - Apply an action
//! - POST /documents/{id}/advance               - Advance to the next step
//! - POST /documents/{id}/return                - Return to the previous step
//! - POST /documents/{id}/move                  - Move to a given step
//! - POST /documents/{id}/complete              - Complete from the final step
//! - POST /documents/{id}/statuses/{status_id}  - Toggle one status
//! - GET  /documents/{id}/workflow              - Current workflow state
//! - GET  /documents/{id}/history               - History entries
//! - GET  /documents/{id}/statuses              - Status ledger
//!
//! Errors are `{"error": message, "kind": kind}` with validation 422,
//! authorization 403, state 409 and integrity 500.

mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use circuit_engine::{EngineError, ErrorKind, WorkflowEngine};
use circuit_storage::InMemoryStorage;
use tower_http::cors::{Any, CorsLayer};

use self::handlers::{
    handle_advance, handle_assign, handle_complete, handle_health, handle_history,
    handle_list_circuits, handle_move, handle_not_found, handle_process, handle_register,
    handle_return, handle_set_status, handle_statuses, handle_workflow,
};
use self::middleware::{log_requests, rate_limit_middleware};
use self::state::{AppState, RateLimiter};
use crate::settings::Settings;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::State => StatusCode::CONFLICT,
        ErrorKind::Integrity => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map an engine error to its HTTP response.
fn engine_error(e: EngineError) -> Response {
    let kind = e.kind();
    let body = serde_json::json!({
        "error": e.to_string(),
        "kind": kind,
    });
    (status_for(kind), Json(body)).into_response()
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/circuits", get(handle_list_circuits))
        .route("/documents", post(handle_register))
        .route("/documents/{id}/assign", post(handle_assign))
        .route("/documents/{id}/process", post(handle_process))
        .route("/documents/{id}/advance", post(handle_advance))
        .route("/documents/{id}/return", post(handle_return))
        .route("/documents/{id}/move", post(handle_move))
        .route("/documents/{id}/complete", post(handle_complete))
        .route("/documents/{id}/statuses/{status_id}", post(handle_set_status))
        .route("/documents/{id}/workflow", get(handle_workflow))
        .route("/documents/{id}/history", get(handle_history))
        .route("/documents/{id}/statuses", get(handle_statuses))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(log_requests))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Build the engine from `settings` and serve until Ctrl+C.
pub async fn start_server(
    settings: Settings,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = settings.workflow.build_registry()?;
    let roles = settings.workflow.role_provider();
    tracing::info!(
        circuits = registry.circuits().count(),
        actions = registry.actions().count(),
        actors = roles.len(),
        "workflow configuration loaded"
    );

    let engine = WorkflowEngine::new(
        Arc::new(InMemoryStorage::new()),
        registry,
        Arc::new(roles),
    );
    let rate_limit = settings.server.rate_limit;
    tracing::info!("rate limit: {} requests per minute per IP", rate_limit);

    let state = Arc::new(AppState {
        engine,
        rate_limiter: RateLimiter::new(rate_limit),
    });
    let app = router(state);

    let port = port_override.unwrap_or(settings.server.port);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("circuit listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
