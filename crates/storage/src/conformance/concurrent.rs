use std::future::Future;
use std::sync::Arc;

use super::{make_step_update, seed_document, TestResult};
use crate::{StorageError, WorkflowStorage};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_exactly_one_wins",
        concurrent_updates_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_different_documents_all_succeed",
        concurrent_updates_different_documents_all_succeed(factory).await,
    ));

    results
}

// ── Concurrent update: exactly one wins ─────────────────────────────────────

/// N tasks each open a snapshot and attempt to move the same document from
/// version 0. Exactly one commit succeeds; the rest must get
/// ConcurrentConflict, either from the update or from the commit.
async fn concurrent_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_document(storage.as_ref(), "doc-1").await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let result = s
                .update_workflow_state(
                    &mut snap,
                    "doc-1",
                    0,
                    make_step_update("c", &format!("step-{i}")),
                )
                .await;
            match result {
                Ok(_new_version) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
                    Err(e) => Err(e),
                },
                Err(StorageError::ConcurrentConflict { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let state = storage
        .get_workflow_state("doc-1")
        .await
        .map_err(|e| e.to_string())?;
    if state.version != 1 {
        return Err(format!("expected version 1 after race, got {}", state.version));
    }
    Ok(())
}

// ── Concurrent updates to different documents: all succeed ──────────────────

/// N tasks each update a different document. All should succeed: no false
/// conflicts when there is no contention.
async fn concurrent_updates_different_documents_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    for i in 0..N {
        seed_document(storage.as_ref(), &format!("doc-{i}")).await?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let document_id = format!("doc-{i}");
            let mut snap = s.begin_snapshot().await?;
            s.update_workflow_state(&mut snap, &document_id, 0, make_step_update("c", "step-a"))
                .await?;
            s.commit_snapshot(snap).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
    }

    for i in 0..N {
        let state = storage
            .get_workflow_state(&format!("doc-{i}"))
            .await
            .map_err(|e| e.to_string())?;
        if state.version != 1 {
            return Err(format!("doc-{i}: expected version 1, got {}", state.version));
        }
    }
    Ok(())
}
