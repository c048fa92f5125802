//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use circuit_engine::{ProcessRequest, TransitionOutcome};
use serde::{Deserialize, Serialize};

use super::state::AppState;
use super::{engine_error, json_error};

// ── Request bodies ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterBody {
    id: String,
    title: String,
    created_by: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AssignBody {
    circuit_id: String,
    actor_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessBody {
    action_id: String,
    actor_id: String,
    #[serde(default)]
    comments: String,
    #[serde(default)]
    auto_advance: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionBody {
    actor_id: String,
    #[serde(default)]
    comments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoveBody {
    target_step_id: String,
    actor_id: String,
    #[serde(default)]
    comments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusBody {
    is_complete: bool,
    actor_id: String,
    #[serde(default)]
    comments: String,
}

fn ok<T: Serialize>(status: StatusCode, value: T) -> Response {
    (status, Json(value)).into_response()
}

fn transition_response(result: Result<TransitionOutcome, circuit_engine::EngineError>) -> Response {
    match result {
        Ok(outcome) => ok(StatusCode::OK, outcome),
        Err(e) => engine_error(e),
    }
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /circuits
pub(crate) async fn handle_list_circuits(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.engine.registry().await;
    let circuits: Vec<_> = registry.circuits().collect();
    let actions: Vec<_> = registry.actions().collect();
    let response = serde_json::json!({
        "circuits": circuits,
        "actions": actions,
    });
    (StatusCode::OK, Json(response))
}

// ── Documents ─────────────────────────────────────────────────────────────────

/// POST /documents
pub(crate) async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> Response {
    match state
        .engine
        .register_document(&body.id, &body.title, &body.created_by)
        .await
    {
        Ok(workflow) => ok(StatusCode::CREATED, workflow),
        Err(e) => engine_error(e),
    }
}

/// POST /documents/{id}/assign
pub(crate) async fn handle_assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AssignBody>,
) -> Response {
    transition_response(
        state
            .engine
            .assign_circuit(&id, &body.circuit_id, &body.actor_id)
            .await,
    )
}

/// POST /documents/{id}/process
pub(crate) async fn handle_process(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ProcessBody>,
) -> Response {
    let request = ProcessRequest {
        action_id: body.action_id,
        actor_id: body.actor_id,
        comments: body.comments,
        auto_advance: body.auto_advance,
    };
    match state.engine.process(&id, request).await {
        Ok(result) => ok(StatusCode::OK, result),
        Err(e) => engine_error(e),
    }
}

/// POST /documents/{id}/advance
pub(crate) async fn handle_advance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Response {
    transition_response(
        state
            .engine
            .advance(&id, &body.actor_id, &body.comments)
            .await,
    )
}

/// POST /documents/{id}/return
pub(crate) async fn handle_return(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Response {
    transition_response(
        state
            .engine
            .return_to_previous(&id, &body.actor_id, &body.comments)
            .await,
    )
}

/// POST /documents/{id}/move
pub(crate) async fn handle_move(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MoveBody>,
) -> Response {
    transition_response(
        state
            .engine
            .move_to(&id, &body.target_step_id, &body.actor_id, &body.comments)
            .await,
    )
}

/// POST /documents/{id}/complete
pub(crate) async fn handle_complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Response {
    transition_response(
        state
            .engine
            .complete(&id, &body.actor_id, &body.comments)
            .await,
    )
}

/// POST /documents/{id}/statuses/{status_id}
pub(crate) async fn handle_set_status(
    State(state): State<Arc<AppState>>,
    Path((id, status_id)): Path<(String, String)>,
    Json(body): Json<StatusBody>,
) -> Response {
    match state
        .engine
        .complete_status(
            &id,
            &status_id,
            body.is_complete,
            &body.actor_id,
            &body.comments,
        )
        .await
    {
        Ok(record) => ok(StatusCode::OK, record),
        Err(e) => engine_error(e),
    }
}

// ── Reads ─────────────────────────────────────────────────────────────────────

/// GET /documents/{id}/workflow
pub(crate) async fn handle_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.engine.workflow_status(&id).await {
        Ok(workflow) => {
            let response = serde_json::json!({
                "workflow": workflow,
                "status_code": workflow.status.code(),
                "position": circuit_engine::Position::of(&workflow),
            });
            ok(StatusCode::OK, response)
        }
        Err(e) => engine_error(e),
    }
}

/// GET /documents/{id}/history
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.engine.history(&id).await {
        Ok(history) => ok(StatusCode::OK, serde_json::json!({ "history": history })),
        Err(e) => engine_error(e),
    }
}

/// GET /documents/{id}/statuses
pub(crate) async fn handle_statuses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.engine.step_statuses(&id).await {
        Ok(statuses) => ok(StatusCode::OK, serde_json::json!({ "statuses": statuses })),
        Err(e) => engine_error(e),
    }
}
