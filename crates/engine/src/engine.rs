//! The public entry point: every workflow operation runs here as one atomic
//! unit per document.

use std::sync::Arc;

use circuit_storage::{
    DocumentRecord, DocumentStatusRecord, HistoryKind, HistoryRecord, WorkflowStateRecord,
    WorkflowStorage,
};
use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::action::{ActionProcessor, ProcessRequest, ProcessResult};
use crate::error::{EngineError, ErrorKind};
use crate::history::{now_rfc3339, HistoryDraft, HistoryRecorder};
use crate::identity::{IdentityError, RoleProvider};
use crate::ledger::StatusLedger;
use crate::locks::DocumentLocks;
use crate::notify::{NotificationSink, TracingSink, WorkflowEvent};
use crate::registry::CircuitRegistry;
use crate::transition::{current_position, TransitionEngine, TransitionOutcome};
use crate::types::{Position, Role};

/// Status of one step status for a document, joined with its definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepStatusView {
    pub step_id: String,
    pub status_id: String,
    pub title: String,
    pub is_required: bool,
    pub is_complete: bool,
    pub completed_by: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Move<'r> {
    Advance,
    Return,
    To(&'r str),
    Complete,
}

impl Move<'_> {
    fn name(&self) -> &'static str {
        match self {
            Move::Advance => "advance",
            Move::Return => "return_to_previous",
            Move::To(_) => "move_to",
            Move::Complete => "complete",
        }
    }
}

pub struct WorkflowEngine<S: WorkflowStorage> {
    storage: Arc<S>,
    registry: RwLock<CircuitRegistry>,
    roles: Arc<dyn RoleProvider>,
    sink: Arc<dyn NotificationSink>,
    locks: DocumentLocks,
}

impl<S: WorkflowStorage> WorkflowEngine<S> {
    pub fn new(storage: Arc<S>, registry: CircuitRegistry, roles: Arc<dyn RoleProvider>) -> Self {
        Self {
            storage,
            registry: RwLock::new(registry),
            roles,
            sink: Arc::new(TracingSink),
            locks: DocumentLocks::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub async fn registry(&self) -> RwLockReadGuard<'_, CircuitRegistry> {
        self.registry.read().await
    }

    /// Exclusive access for structural edits. Workflow operations wait until
    /// the guard is dropped.
    pub async fn registry_mut(&self) -> RwLockWriteGuard<'_, CircuitRegistry> {
        self.registry.write().await
    }

    // ── Documents ────────────────────────────────────────────────────────────

    pub async fn register_document(
        &self,
        document_id: &str,
        title: &str,
        created_by: &str,
    ) -> Result<WorkflowStateRecord, EngineError> {
        let _guard = self.locks.acquire(document_id).await;
        let mut snapshot = self.storage.begin_snapshot().await?;
        let created_at = now_rfc3339();
        let result = self
            .storage
            .insert_document(
                &mut snapshot,
                DocumentRecord {
                    id: document_id.to_string(),
                    title: title.to_string(),
                    created_by: created_by.to_string(),
                    created_at: created_at.clone(),
                },
            )
            .await
            .map_err(EngineError::from);
        self.finish(snapshot, document_id, "register_document", result).await?;
        tracing::info!(document_id, created_by, "document registered");
        Ok(WorkflowStateRecord::draft(document_id, &created_at))
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    pub async fn assign_circuit(
        &self,
        document_id: &str,
        circuit_id: &str,
        actor_id: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        let outcome = {
            let _guard = self.locks.acquire(document_id).await;
            let registry = self.registry.read().await;
            let mut snapshot = self.storage.begin_snapshot().await?;
            let result = self
                .assign_in(&mut snapshot, &registry, document_id, circuit_id, actor_id)
                .await;
            self.finish(snapshot, document_id, "assign_circuit", result).await?
        };
        self.publish(vec![outcome.event.clone()]);
        Ok(outcome)
    }

    async fn assign_in(
        &self,
        snapshot: &mut S::Snapshot,
        registry: &CircuitRegistry,
        document_id: &str,
        circuit_id: &str,
        actor_id: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        let transitions = TransitionEngine::new(self.storage.as_ref());
        let state = self
            .storage
            .get_workflow_state_for_update(snapshot, document_id)
            .await?;
        let (circuit, planned) = transitions.plan_assign(registry, &state, circuit_id)?;
        transitions
            .apply(snapshot, &state, circuit, planned, actor_id, "")
            .await
    }

    pub async fn advance(
        &self,
        document_id: &str,
        actor_id: &str,
        comments: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(document_id, actor_id, comments, Move::Advance)
            .await
    }

    pub async fn return_to_previous(
        &self,
        document_id: &str,
        actor_id: &str,
        comments: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(document_id, actor_id, comments, Move::Return)
            .await
    }

    pub async fn move_to(
        &self,
        document_id: &str,
        target_step_id: &str,
        actor_id: &str,
        comments: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(document_id, actor_id, comments, Move::To(target_step_id))
            .await
    }

    /// Finish the circuit from its final step.
    pub async fn complete(
        &self,
        document_id: &str,
        actor_id: &str,
        comments: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        self.transition(document_id, actor_id, comments, Move::Complete)
            .await
    }

    async fn transition(
        &self,
        document_id: &str,
        actor_id: &str,
        comments: &str,
        request: Move<'_>,
    ) -> Result<TransitionOutcome, EngineError> {
        let outcome = {
            let _guard = self.locks.acquire(document_id).await;
            let registry = self.registry.read().await;
            let mut snapshot = self.storage.begin_snapshot().await?;
            let result = self
                .transition_in(
                    &mut snapshot,
                    &registry,
                    document_id,
                    actor_id,
                    comments,
                    request,
                )
                .await;
            self.finish(snapshot, document_id, request.name(), result).await?
        };
        self.publish(vec![outcome.event.clone()]);
        Ok(outcome)
    }

    async fn transition_in(
        &self,
        snapshot: &mut S::Snapshot,
        registry: &CircuitRegistry,
        document_id: &str,
        actor_id: &str,
        comments: &str,
        request: Move<'_>,
    ) -> Result<TransitionOutcome, EngineError> {
        let transitions = TransitionEngine::new(self.storage.as_ref());
        let state = self
            .storage
            .get_workflow_state_for_update(snapshot, document_id)
            .await?;
        let (circuit, step) = current_position(registry, &state)?;

        let planned = match request {
            Move::Advance => {
                transitions
                    .plan_advance(snapshot, document_id, circuit, step)
                    .await?
            }
            Move::Return => transitions.plan_return(circuit, step)?,
            Move::To(target) => {
                transitions
                    .plan_move(snapshot, document_id, circuit, step, target)
                    .await?
            }
            Move::Complete => {
                transitions
                    .plan_complete(snapshot, document_id, circuit, step)
                    .await?
            }
        };
        transitions
            .apply(snapshot, &state, circuit, planned, actor_id, comments)
            .await
    }

    // ── Actions ──────────────────────────────────────────────────────────────

    /// Apply an approve/reject action to the document's current step.
    ///
    /// The actor's role is resolved before the document lock is taken.
    pub async fn process(
        &self,
        document_id: &str,
        request: ProcessRequest,
    ) -> Result<ProcessResult, EngineError> {
        let role = self.resolve_role(&request.actor_id).await?;

        let processed = {
            let _guard = self.locks.acquire(document_id).await;
            let registry = self.registry.read().await;
            let mut snapshot = self.storage.begin_snapshot().await?;
            let result = self
                .process_in(&mut snapshot, &registry, document_id, role, &request)
                .await;
            self.finish(snapshot, document_id, "process", result).await?
        };
        self.publish(processed.events.clone());
        Ok(processed)
    }

    async fn process_in(
        &self,
        snapshot: &mut S::Snapshot,
        registry: &CircuitRegistry,
        document_id: &str,
        role: Role,
        request: &ProcessRequest,
    ) -> Result<ProcessResult, EngineError> {
        let state = self
            .storage
            .get_workflow_state_for_update(snapshot, document_id)
            .await?;
        ActionProcessor::new(self.storage.as_ref())
            .process(snapshot, registry, &state, role, request)
            .await
    }

    async fn resolve_role(&self, actor_id: &str) -> Result<Role, EngineError> {
        self.roles
            .actor_role(actor_id)
            .await
            .map_err(|e| match e {
                IdentityError::UnknownActor(actor_id) => EngineError::UnknownActor { actor_id },
                IdentityError::Unavailable(reason) => EngineError::IdentityUnavailable(reason),
            })
    }

    // ── Manual status toggle ─────────────────────────────────────────────────

    /// Set one status of the document's circuit complete or incomplete.
    pub async fn complete_status(
        &self,
        document_id: &str,
        status_id: &str,
        is_complete: bool,
        actor_id: &str,
        comments: &str,
    ) -> Result<DocumentStatusRecord, EngineError> {
        let record = {
            let _guard = self.locks.acquire(document_id).await;
            let registry = self.registry.read().await;
            let mut snapshot = self.storage.begin_snapshot().await?;
            let result = self
                .complete_status_in(
                    &mut snapshot,
                    &registry,
                    document_id,
                    status_id,
                    is_complete,
                    actor_id,
                    comments,
                )
                .await;
            self.finish(snapshot, document_id, "complete_status", result).await?
        };
        self.publish(vec![WorkflowEvent::StatusChanged {
            document_id: document_id.to_string(),
            status_id: status_id.to_string(),
            is_complete: record.is_complete,
            actor_id: actor_id.to_string(),
        }]);
        Ok(record)
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete_status_in(
        &self,
        snapshot: &mut S::Snapshot,
        registry: &CircuitRegistry,
        document_id: &str,
        status_id: &str,
        is_complete: bool,
        actor_id: &str,
        comments: &str,
    ) -> Result<DocumentStatusRecord, EngineError> {
        let state = self
            .storage
            .get_workflow_state_for_update(snapshot, document_id)
            .await?;
        let (circuit, _) = current_position(registry, &state)?;
        let (step, status) =
            circuit
                .status(status_id)
                .ok_or_else(|| EngineError::StatusNotFound {
                    status_id: status_id.to_string(),
                })?;

        let record = StatusLedger::new(self.storage.as_ref())
            .set_status(snapshot, document_id, step, status, is_complete, actor_id)
            .await?;
        HistoryRecorder::new(self.storage.as_ref())
            .record(
                snapshot,
                document_id,
                actor_id,
                HistoryDraft {
                    kind: HistoryKind::StatusChanged,
                    step_id: step.id.clone(),
                    from_step_id: None,
                    to_step_id: None,
                    action_id: None,
                    status_id: Some(status.id.clone()),
                    comments: comments.to_string(),
                    is_approved: is_complete,
                },
            )
            .await?;
        tracing::info!(document_id, status_id, is_complete, "status changed");
        Ok(record)
    }

    // ── Reads (committed data, no document lock) ─────────────────────────────

    pub async fn workflow_status(
        &self,
        document_id: &str,
    ) -> Result<WorkflowStateRecord, EngineError> {
        Ok(self.storage.get_workflow_state(document_id).await?)
    }

    pub async fn history(&self, document_id: &str) -> Result<Vec<HistoryRecord>, EngineError> {
        Ok(self.storage.list_history(document_id).await?)
    }

    /// Every status of the document's circuit, in step order, with the
    /// document's completion. Empty while no circuit is assigned.
    pub async fn step_statuses(
        &self,
        document_id: &str,
    ) -> Result<Vec<StepStatusView>, EngineError> {
        let state = self.storage.get_workflow_state(document_id).await?;
        let circuit_id = match Position::of(&state) {
            Position::Unassigned => return Ok(Vec::new()),
            Position::AtStep { circuit_id, .. } | Position::Completed { circuit_id } => circuit_id,
        };
        let rows = self.storage.list_document_statuses(document_id).await?;
        let registry = self.registry.read().await;
        let circuit =
            registry
                .circuit(&circuit_id)
                .ok_or_else(|| EngineError::DanglingReference {
                    document_id: document_id.to_string(),
                    reference: format!("circuit '{circuit_id}'"),
                })?;

        Ok(circuit
            .steps
            .iter()
            .flat_map(|step| step.statuses.iter().map(move |status| (step, status)))
            .map(|(step, status)| {
                let row = rows.iter().find(|r| r.status_id == status.id);
                StepStatusView {
                    step_id: step.id.clone(),
                    status_id: status.id.clone(),
                    title: status.title.clone(),
                    is_required: status.is_required,
                    is_complete: row.is_some_and(|r| r.is_complete),
                    completed_by: row.and_then(|r| r.completed_by.clone()),
                    completed_at: row.and_then(|r| r.completed_at.clone()),
                }
            })
            .collect())
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// Commit on success, abort on failure. Nothing from a failed operation
    /// is persisted.
    async fn finish<T>(
        &self,
        snapshot: S::Snapshot,
        document_id: &str,
        operation: &'static str,
        result: Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let result = match result {
            Ok(value) => self
                .storage
                .commit_snapshot(snapshot)
                .await
                .map(|()| value)
                .map_err(EngineError::from),
            Err(e) => {
                if let Err(abort) = self.storage.abort_snapshot(snapshot).await {
                    tracing::warn!(
                        document_id,
                        operation,
                        error = %abort,
                        "snapshot abort failed"
                    );
                }
                Err(e)
            }
        };
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Integrity {
                tracing::error!(document_id, operation, error = %e, "workflow operation failed");
            } else {
                tracing::debug!(
                    document_id,
                    operation,
                    kind = %e.kind(),
                    error = %e,
                    "workflow operation rejected"
                );
            }
        }
        result
    }

    /// Deliver `events` in order on a background task. Called after commit
    /// with every guard released; the caller never waits on the sink.
    fn publish(&self, events: Vec<WorkflowEvent>) {
        if events.is_empty() {
            return;
        }
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            for event in &events {
                if let Err(e) = sink.notify(event).await {
                    tracing::warn!(
                        document_id = event.document_id(),
                        error = %e,
                        "notification not delivered"
                    );
                }
            }
        });
    }
}
