//! Conformance test suite for `WorkflowStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `WorkflowStorage` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Registration**: document creation, duplicate detection, initial state
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: all-or-nothing semantics for multi-record snapshots
//! - **Concurrency**: version conflicts under real task parallelism
//! - **Error handling**: correct error variants for invalid operations
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use circuit_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod error;
mod init;
mod snapshot;

use std::fmt;
use std::future::Future;

use crate::record::{
    DocumentRecord, DocumentStatusRecord, HistoryKind, HistoryRecord, WorkflowStateUpdate,
    WorkflowStatus,
};
use crate::WorkflowStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "insert_document_starts_as_draft").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: WorkflowStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_document(id: &str) -> DocumentRecord {
    DocumentRecord {
        id: id.to_string(),
        title: format!("Document {id}"),
        created_by: "test-author".to_string(),
        created_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

fn make_step_update(circuit_id: &str, step_id: &str) -> WorkflowStateUpdate {
    WorkflowStateUpdate {
        circuit_id: Some(circuit_id.to_string()),
        current_step_id: Some(step_id.to_string()),
        status: WorkflowStatus::InProgress,
        updated_at: "2025-01-01T00:00:30Z".to_string(),
    }
}

fn make_status(document_id: &str, status_id: &str, is_complete: bool) -> DocumentStatusRecord {
    DocumentStatusRecord {
        document_id: document_id.to_string(),
        status_id: status_id.to_string(),
        step_id: "step-a".to_string(),
        is_complete,
        completed_by: is_complete.then(|| "test-actor".to_string()),
        completed_at: is_complete.then(|| "2025-01-01T00:00:45Z".to_string()),
    }
}

fn make_history(id: &str, document_id: &str) -> HistoryRecord {
    HistoryRecord {
        id: id.to_string(),
        document_id: document_id.to_string(),
        kind: HistoryKind::Advanced,
        step_id: "step-a".to_string(),
        from_step_id: Some("step-a".to_string()),
        to_step_id: Some("step-b".to_string()),
        action_id: None,
        status_id: None,
        processed_by: "test-actor".to_string(),
        processed_at: "2025-01-01T00:01:00Z".to_string(),
        comments: String::new(),
        is_approved: true,
    }
}

/// Register `document_id` in its own committed snapshot.
async fn seed_document<S: WorkflowStorage>(s: &S, document_id: &str) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_document(&mut snap, make_document(document_id))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}
