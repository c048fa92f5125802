use std::future::Future;

use super::{make_history, make_status, make_step_update, seed_document, TestResult};
use crate::{StorageError, WorkflowStateUpdate, WorkflowStatus, WorkflowStorage};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "state_status_and_history_visible_after_commit",
        state_status_and_history_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "completed_status_sets_completed_flag",
        completed_status_sets_completed_flag(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "sequential_updates_increment_version",
        sequential_updates_increment_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "upsert_keeps_one_row_per_status",
        upsert_keeps_one_row_per_status(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "history_preserves_insertion_order",
        history_preserves_insertion_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "stale_snapshot_commit_fails_without_partial_writes",
        stale_snapshot_commit_fails_without_partial_writes(factory).await,
    ));

    results
}

async fn state_status_and_history_visible_after_commit<S, F, Fut>(
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
    s.update_workflow_state(&mut snap, "doc-1", 0, make_step_update("c", "step-a"))
        .await
        .map_err(|e| e.to_string())?;
    s.upsert_document_status(&mut snap, make_status("doc-1", "s1", true))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_history(&mut snap, make_history("h-1", "doc-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let state = s
        .get_workflow_state("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    if state.version != 1 || state.status != WorkflowStatus::InProgress {
        return Err(format!("unexpected committed state: {state:?}"));
    }
    let statuses = s
        .list_document_statuses("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    if statuses.len() != 1 || !statuses[0].is_complete {
        return Err(format!("unexpected committed statuses: {statuses:?}"));
    }
    let history = s.list_history("doc-1").await.map_err(|e| e.to_string())?;
    if history != vec![make_history("h-1", "doc-1")] {
        return Err(format!("unexpected committed history: {history:?}"));
    }
    Ok(())
}

async fn completed_status_sets_completed_flag<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_workflow_state(
        &mut snap,
        "doc-1",
        0,
        WorkflowStateUpdate {
            circuit_id: Some("c".to_string()),
            current_step_id: Some("step-b".to_string()),
            status: WorkflowStatus::Completed,
            updated_at: "2025-01-01T00:02:00Z".to_string(),
        },
    )
    .await
    .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let state = s
        .get_workflow_state("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    if !state.is_circuit_completed {
        return Err("Completed status must set is_circuit_completed".to_string());
    }
    Ok(())
}

async fn sequential_updates_increment_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    for expected in 0..3i64 {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let v = s
            .update_workflow_state(
                &mut snap,
                "doc-1",
                expected,
                make_step_update("c", &format!("step-{expected}")),
            )
            .await
            .map_err(|e| e.to_string())?;
        if v != expected + 1 {
            return Err(format!("expected version {}, got {v}", expected + 1));
        }
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let state = s
        .get_workflow_state("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    if state.version != 3 {
        return Err(format!("expected final version 3, got {}", state.version));
    }
    Ok(())
}

async fn upsert_keeps_one_row_per_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    for _ in 0..2 {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.upsert_document_status(&mut snap, make_status("doc-1", "s1", true))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let statuses = s
        .list_document_statuses("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    if statuses.len() != 1 {
        return Err(format!("expected 1 row, got {}", statuses.len()));
    }
    Ok(())
}

async fn history_preserves_insertion_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let ids = ["h-3", "h-1", "h-2"];
    for id in ids {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.insert_history(&mut snap, make_history(id, "doc-1"))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let history = s.list_history("doc-1").await.map_err(|e| e.to_string())?;
    let got: Vec<&str> = history.iter().map(|h| h.id.as_str()).collect();
    if got != ids {
        return Err(format!("expected {ids:?}, got {got:?}"));
    }
    Ok(())
}

/// Two snapshots update from the same version. The second commit must fail
/// and none of its other writes (status rows, history) may persist.
async fn stale_snapshot_commit_fails_without_partial_writes<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let mut first = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut second = s.begin_snapshot().await.map_err(|e| e.to_string())?;

    s.update_workflow_state(&mut first, "doc-1", 0, make_step_update("c", "step-a"))
        .await
        .map_err(|e| e.to_string())?;

    let staged = s
        .update_workflow_state(&mut second, "doc-1", 0, make_step_update("c", "step-b"))
        .await;
    if let Err(e) = &staged {
        if !matches!(e, StorageError::ConcurrentConflict { .. }) {
            return Err(format!("unexpected error staging second update: {e}"));
        }
    }

    s.commit_snapshot(first).await.map_err(|e| e.to_string())?;

    if staged.is_ok() {
        s.upsert_document_status(&mut second, make_status("doc-1", "s1", true))
            .await
            .map_err(|e| e.to_string())?;
        s.insert_history(&mut second, make_history("h-2", "doc-1"))
            .await
            .map_err(|e| e.to_string())?;
        match s.commit_snapshot(second).await {
            Err(StorageError::ConcurrentConflict { .. }) => {}
            other => return Err(format!("expected ConcurrentConflict, got {other:?}")),
        }
    } else {
        let _ = s.abort_snapshot(second).await;
    }

    let state = s
        .get_workflow_state("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    if state.current_step_id.as_deref() != Some("step-a") || state.version != 1 {
        return Err(format!("first commit should have won: {state:?}"));
    }
    let statuses = s
        .list_document_statuses("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    let history = s.list_history("doc-1").await.map_err(|e| e.to_string())?;
    if !statuses.is_empty() || !history.is_empty() {
        return Err("losing snapshot left partial writes".to_string());
    }
    Ok(())
}
