//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! visible inside it, and that aborted writes are discarded.

use std::future::Future;

use super::{make_document, make_history, make_status, make_step_update, seed_document, TestResult};
use crate::{StorageError, WorkflowStatus, WorkflowStorage};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_document_invisible",
        uncommitted_document_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_state_update_invisible",
        uncommitted_state_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_reads_its_own_writes",
        snapshot_reads_its_own_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_status_overlay_replaces_committed_row",
        snapshot_status_overlay_replaces_committed_row(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_all_writes",
        abort_discards_all_writes(factory).await,
    ));

    results
}

async fn uncommitted_document_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_document(&mut snap, make_document("doc-1"))
        .await
        .map_err(|e| e.to_string())?;

    let outside = s.get_document("doc-1").await;
    let _ = s.abort_snapshot(snap).await;
    match outside {
        Err(StorageError::DocumentNotFound { .. }) => Ok(()),
        other => Err(format!("uncommitted document leaked: {other:?}")),
    }
}

async fn uncommitted_state_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_workflow_state(&mut snap, "doc-1", 0, make_step_update("c", "step-a"))
        .await
        .map_err(|e| e.to_string())?;

    let outside = s
        .get_workflow_state("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;
    if outside.status != WorkflowStatus::Draft || outside.version != 0 {
        return Err(format!("uncommitted update leaked: {outside:?}"));
    }
    Ok(())
}

async fn snapshot_reads_its_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_document(&mut snap, make_document("doc-1"))
        .await
        .map_err(|e| e.to_string())?;
    let v1 = s
        .update_workflow_state(&mut snap, "doc-1", 0, make_step_update("c", "step-a"))
        .await
        .map_err(|e| e.to_string())?;
    s.upsert_document_status(&mut snap, make_status("doc-1", "s1", false))
        .await
        .map_err(|e| e.to_string())?;

    let state = s
        .get_workflow_state_for_update(&mut snap, "doc-1")
        .await
        .map_err(|e| e.to_string())?;
    let statuses = s
        .get_document_statuses_for_update(&mut snap, "doc-1")
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;

    if v1 != 1 || state.version != 1 {
        return Err(format!("expected version 1 inside snapshot, got {v1}/{}", state.version));
    }
    if state.current_step_id.as_deref() != Some("step-a") {
        return Err(format!("expected step-a, got {:?}", state.current_step_id));
    }
    if statuses.len() != 1 {
        return Err(format!("expected 1 staged status, got {}", statuses.len()));
    }
    Ok(())
}

async fn snapshot_status_overlay_replaces_committed_row<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.upsert_document_status(&mut snap, make_status("doc-1", "s1", false))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.upsert_document_status(&mut snap, make_status("doc-1", "s1", true))
        .await
        .map_err(|e| e.to_string())?;
    let inside = s
        .get_document_statuses_for_update(&mut snap, "doc-1")
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;

    match inside.as_slice() {
        [row] if row.is_complete => Ok(()),
        other => Err(format!("expected one complete row, got {other:?}")),
    }
}

async fn abort_discards_all_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_workflow_state(&mut snap, "doc-1", 0, make_step_update("c", "step-a"))
        .await
        .map_err(|e| e.to_string())?;
    s.upsert_document_status(&mut snap, make_status("doc-1", "s1", true))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_history(&mut snap, make_history("h-1", "doc-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let state = s
        .get_workflow_state("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    let statuses = s
        .list_document_statuses("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    let history = s.list_history("doc-1").await.map_err(|e| e.to_string())?;
    if state.version != 0 || !statuses.is_empty() || !history.is_empty() {
        return Err("aborted snapshot left writes behind".to_string());
    }
    Ok(())
}
