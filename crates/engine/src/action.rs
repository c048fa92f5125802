//! Approve/reject actions applied to a document's current step.

use circuit_storage::{
    DocumentStatusRecord, HistoryKind, HistoryRecord, WorkflowStateRecord, WorkflowStorage,
};
use serde::Serialize;

use crate::error::EngineError;
use crate::history::{HistoryDraft, HistoryRecorder};
use crate::ledger::StatusLedger;
use crate::notify::WorkflowEvent;
use crate::registry::CircuitRegistry;
use crate::transition::{current_position, TransitionEngine, TransitionOutcome};
use crate::types::{Role, Step};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub action_id: String,
    pub actor_id: String,
    pub comments: String,
    /// Advance in the same unit of work when an approval completes the step.
    /// Only honoured by ordered circuits.
    pub auto_advance: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub history: HistoryRecord,
    pub is_approved: bool,
    /// Status rows touched by the action's effects.
    pub statuses: Vec<DocumentStatusRecord>,
    /// Whether the step the action was applied to is now complete.
    pub step_complete: bool,
    /// The chained transition, when the action advanced the document.
    pub advanced: Option<HistoryRecord>,
    pub state: WorkflowStateRecord,
    #[serde(skip)]
    pub(crate) events: Vec<WorkflowEvent>,
}

/// The actor's role must match the step's responsible role, when it has one.
pub fn authorize(actor_id: &str, role: Role, step: &Step) -> Result<(), EngineError> {
    match step.responsible_role {
        Some(required) if required != role => Err(EngineError::UnauthorizedRole {
            actor_id: actor_id.to_string(),
            role,
            step_id: step.id.clone(),
            required,
        }),
        _ => Ok(()),
    }
}

pub struct ActionProcessor<'a, S: WorkflowStorage> {
    ledger: StatusLedger<'a, S>,
    history: HistoryRecorder<'a, S>,
    transitions: TransitionEngine<'a, S>,
}

impl<'a, S: WorkflowStorage> ActionProcessor<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self {
            ledger: StatusLedger::new(storage),
            history: HistoryRecorder::new(storage),
            transitions: TransitionEngine::new(storage),
        }
    }

    /// Apply `request` to the document whose current state is `state`.
    ///
    /// Writes exactly one `Action` history entry. A chained advancement writes
    /// its own entry after it.
    pub async fn process(
        &self,
        snapshot: &mut S::Snapshot,
        registry: &CircuitRegistry,
        state: &WorkflowStateRecord,
        role: Role,
        request: &ProcessRequest,
    ) -> Result<ProcessResult, EngineError> {
        let document_id = state.document_id.as_str();
        let (circuit, step) = current_position(registry, state)?;
        authorize(&request.actor_id, role, step)?;
        let action =
            registry
                .action(&request.action_id)
                .ok_or_else(|| EngineError::ActionNotFound {
                    action_id: request.action_id.clone(),
                })?;

        let statuses = self
            .ledger
            .apply_status_effects(
                snapshot,
                document_id,
                step,
                &action.effects,
                &request.actor_id,
            )
            .await?;

        let is_approved = action.kind.is_approval();
        let history = self
            .history
            .record(
                snapshot,
                document_id,
                &request.actor_id,
                HistoryDraft {
                    kind: HistoryKind::Action,
                    step_id: step.id.clone(),
                    from_step_id: None,
                    to_step_id: None,
                    action_id: Some(action.id.clone()),
                    status_id: None,
                    comments: request.comments.clone(),
                    is_approved,
                },
            )
            .await?;
        let mut events = vec![WorkflowEvent::ActionProcessed {
            document_id: document_id.to_string(),
            step_id: step.id.clone(),
            action_id: action.id.clone(),
            is_approved,
            actor_id: request.actor_id.clone(),
        }];

        let step_complete = self
            .ledger
            .is_step_complete(snapshot, document_id, step)
            .await?;

        let mut advanced = None;
        let mut result_state = state.clone();
        if is_approved && request.auto_advance && circuit.has_ordered_flow && step_complete {
            let planned = self
                .transitions
                .plan_advance(snapshot, document_id, circuit, step)
                .await?;
            let TransitionOutcome {
                state: next_state,
                history: transition_history,
                event,
            } = self
                .transitions
                .apply(
                    snapshot,
                    state,
                    circuit,
                    planned,
                    &request.actor_id,
                    &request.comments,
                )
                .await?;
            result_state = next_state;
            advanced = Some(transition_history);
            events.push(event);
        }

        tracing::info!(
            document_id,
            step_id = %step.id,
            action_id = %action.id,
            is_approved,
            step_complete,
            advanced = advanced.is_some(),
            "action processed"
        );

        Ok(ProcessResult {
            history,
            is_approved,
            statuses,
            step_complete,
            advanced,
            state: result_state,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(role: Option<Role>) -> Step {
        Step {
            id: "review".to_string(),
            circuit_id: "c".to_string(),
            title: "Review".to_string(),
            order_index: 0,
            responsible_role: role,
            is_final_step: false,
            statuses: vec![],
        }
    }

    #[test]
    fn unrestricted_step_admits_everyone() {
        for role in Role::ALL {
            assert!(authorize("anyone", role, &step(None)).is_ok());
        }
    }

    #[test]
    fn restricted_step_admits_only_its_role() {
        let s = step(Some(Role::Approver));
        assert!(authorize("bob", Role::Approver, &s).is_ok());
        let err = authorize("alice", Role::Administrator, &s).unwrap_err();
        assert_eq!(
            err,
            EngineError::UnauthorizedRole {
                actor_id: "alice".to_string(),
                role: Role::Administrator,
                step_id: "review".to_string(),
                required: Role::Approver,
            }
        );
    }
}
