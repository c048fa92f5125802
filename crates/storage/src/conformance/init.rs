use std::future::Future;

use super::{make_document, seed_document, TestResult};
use crate::{StorageError, WorkflowStatus, WorkflowStorage};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "init",
        "insert_document_starts_as_draft",
        insert_document_starts_as_draft(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_document_starts_at_version_0",
        insert_document_starts_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "inserted_document_readable",
        inserted_document_readable(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "double_insert_in_one_snapshot_rejected",
        double_insert_in_one_snapshot_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "double_insert_across_snapshots_rejected",
        double_insert_across_snapshots_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "new_document_has_no_statuses_or_history",
        new_document_has_no_statuses_or_history(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// A freshly registered document has no circuit and is `Draft`.
async fn insert_document_starts_as_draft<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let state = s
        .get_workflow_state("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    if state.status != WorkflowStatus::Draft {
        return Err(format!("expected Draft, got {:?}", state.status));
    }
    if state.circuit_id.is_some() || state.current_step_id.is_some() {
        return Err("new document must not have a circuit or step".to_string());
    }
    if state.is_circuit_completed {
        return Err("new document must not be completed".to_string());
    }
    Ok(())
}

async fn insert_document_starts_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let state = s
        .get_workflow_state("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    if state.version != 0 {
        return Err(format!("expected version 0, got {}", state.version));
    }
    Ok(())
}

async fn inserted_document_readable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let doc = s.get_document("doc-1").await.map_err(|e| e.to_string())?;
    if doc != make_document("doc-1") {
        return Err(format!("document fields not preserved: {doc:?}"));
    }
    Ok(())
}

async fn double_insert_in_one_snapshot_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let second = s.insert_document(&mut snap, make_document("doc-1")).await;
    let _ = s.abort_snapshot(snap).await;
    match second {
        Err(StorageError::DocumentExists { document_id }) if document_id == "doc-1" => Ok(()),
        other => Err(format!("expected DocumentExists, got {other:?}")),
    }
}

async fn double_insert_across_snapshots_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let second = s.insert_document(&mut snap, make_document("doc-1")).await;
    let _ = s.abort_snapshot(snap).await;
    match second {
        Err(StorageError::DocumentExists { .. }) => Ok(()),
        other => Err(format!("expected DocumentExists, got {other:?}")),
    }
}

async fn new_document_has_no_statuses_or_history<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_document(&s, "doc-1").await?;

    let statuses = s
        .list_document_statuses("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    let history = s.list_history("doc-1").await.map_err(|e| e.to_string())?;
    if !statuses.is_empty() || !history.is_empty() {
        return Err(format!(
            "expected empty ledger and history, got {} statuses and {} entries",
            statuses.len(),
            history.len()
        ));
    }
    Ok(())
}
