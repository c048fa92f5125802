use std::future::Future;

use super::{make_history, make_status, make_step_update, seed_document, TestResult};
use crate::{StorageError, WorkflowStorage};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_document_nonexistent",
        get_document_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_workflow_state_for_update_nonexistent",
        get_workflow_state_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_workflow_state_nonexistent",
        update_workflow_state_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_with_stale_version_conflicts",
        update_with_stale_version_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "status_for_unknown_document_rejected",
        status_for_unknown_document_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "duplicate_history_id_rejected",
        duplicate_history_id_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_history_nonexistent",
        list_history_nonexistent(factory).await,
    ));

    results
}

async fn get_document_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_document("missing").await {
        Err(StorageError::DocumentNotFound { document_id }) if document_id == "missing" => Ok(()),
        other => Err(format!("expected DocumentNotFound, got {other:?}")),
    }
}

async fn get_workflow_state_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.get_workflow_state_for_update(&mut snap, "missing").await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::DocumentNotFound { .. }) => Ok(()),
        other => Err(format!("expected DocumentNotFound, got {other:?}")),
    }
}

async fn update_workflow_state_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_workflow_state(&mut snap, "missing", 0, make_step_update("c", "step-a"))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::DocumentNotFound { .. }) => Ok(()),
        other => Err(format!("expected DocumentNotFound, got {other:?}")),
    }
}

async fn update_with_stale_version_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_workflow_state(&mut snap, "doc-1", 7, make_step_update("c", "step-a"))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ConcurrentConflict {
            document_id,
            expected_version,
        }) if document_id == "doc-1" && expected_version == 7 => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
}

async fn status_for_unknown_document_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .upsert_document_status(&mut snap, make_status("missing", "s1", true))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::DocumentNotFound { .. }) => Ok(()),
        other => Err(format!("expected DocumentNotFound, got {other:?}")),
    }
}

async fn duplicate_history_id_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_history(&mut snap, make_history("h-1", "doc-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.insert_history(&mut snap, make_history("h-1", "doc-1")).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::DuplicateHistoryEntry { entry_id }) if entry_id == "h-1" => Ok(()),
        other => Err(format!("expected DuplicateHistoryEntry, got {other:?}")),
    }
}

async fn list_history_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.list_history("missing").await {
        Err(StorageError::DocumentNotFound { .. }) => Ok(()),
        other => Err(format!("expected DocumentNotFound, got {other:?}")),
    }
}
