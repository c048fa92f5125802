//! The document workflow state machine.
//!
//! `Unassigned -> AtStep(step) -> Completed`. Every method here runs inside
//! a caller-owned snapshot and either returns a [`TransitionOutcome`] or an
//! error after which the caller must abort the snapshot.

use circuit_storage::{
    HistoryKind, HistoryRecord, WorkflowStateRecord, WorkflowStateUpdate, WorkflowStatus,
    WorkflowStorage,
};
use serde::Serialize;

use crate::error::EngineError;
use crate::graph::StepGraph;
use crate::history::{now_rfc3339, HistoryDraft, HistoryRecorder};
use crate::ledger::StatusLedger;
use crate::notify::WorkflowEvent;
use crate::registry::CircuitRegistry;
use crate::types::{Circuit, Position, Step};

/// Where a transition lands.
#[derive(Debug, Clone, Copy)]
pub enum Target<'c> {
    Step(&'c Step),
    Completed,
}

/// A validated, not yet applied, transition.
#[derive(Debug, Clone, Copy)]
pub struct Planned<'c> {
    pub kind: HistoryKind,
    pub from: Option<&'c Step>,
    pub to: Target<'c>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub state: WorkflowStateRecord,
    pub history: HistoryRecord,
    pub event: WorkflowEvent,
}

/// Resolve the circuit and step a document currently sits at.
pub fn current_position<'r>(
    registry: &'r CircuitRegistry,
    state: &WorkflowStateRecord,
) -> Result<(&'r Circuit, &'r Step), EngineError> {
    let document_id = &state.document_id;
    match Position::of(state) {
        Position::Unassigned => Err(EngineError::NoCircuitAssigned {
            document_id: document_id.clone(),
        }),
        Position::Completed { .. } => Err(EngineError::CircuitCompleted {
            document_id: document_id.clone(),
        }),
        Position::AtStep {
            circuit_id,
            step_id,
        } => {
            let circuit =
                registry
                    .circuit(&circuit_id)
                    .ok_or_else(|| EngineError::DanglingReference {
                        document_id: document_id.clone(),
                        reference: format!("circuit '{circuit_id}'"),
                    })?;
            let step = circuit
                .step(&step_id)
                .ok_or_else(|| EngineError::DanglingReference {
                    document_id: document_id.clone(),
                    reference: format!("step '{step_id}'"),
                })?;
            Ok((circuit, step))
        }
    }
}

pub struct TransitionEngine<'a, S: WorkflowStorage> {
    storage: &'a S,
    ledger: StatusLedger<'a, S>,
    history: HistoryRecorder<'a, S>,
}

impl<'a, S: WorkflowStorage> TransitionEngine<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self {
            storage,
            ledger: StatusLedger::new(storage),
            history: HistoryRecorder::new(storage),
        }
    }

    // ── Planning ─────────────────────────────────────────────────────────────

    /// Validate an assignment of circuit `circuit_id` to a document in
    /// `state`.
    ///
    /// A document in progress can only be reassigned once its current step
    /// no longer exists in the registry.
    pub fn plan_assign<'c>(
        &self,
        registry: &'c CircuitRegistry,
        state: &WorkflowStateRecord,
        circuit_id: &str,
    ) -> Result<(&'c Circuit, Planned<'c>), EngineError> {
        if let Position::AtStep { circuit_id: current, step_id } = Position::of(state) {
            if current_position(registry, state).is_ok() {
                return Err(EngineError::invalid_transition(
                    &state.document_id,
                    format!("document is already in progress in circuit '{current}'"),
                ));
            }
            tracing::warn!(
                document_id = %state.document_id,
                circuit_id = %current,
                step_id = %step_id,
                "reassigning document stranded on a removed step"
            );
        }
        let circuit = registry
            .circuit(circuit_id)
            .filter(|c| c.is_active)
            .ok_or_else(|| EngineError::CircuitInactiveOrMissing {
                circuit_id: circuit_id.to_string(),
            })?;
        let first = StepGraph::new(circuit).first_step().ok_or_else(|| {
            EngineError::CircuitInactiveOrMissing {
                circuit_id: circuit_id.to_string(),
            }
        })?;
        Ok((
            circuit,
            Planned {
                kind: HistoryKind::Assigned,
                from: None,
                to: Target::Step(first),
            },
        ))
    }

    /// Ordered flow only: to the next step, or to completion from the final
    /// step. The current step must be complete.
    pub async fn plan_advance<'c>(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        circuit: &'c Circuit,
        step: &'c Step,
    ) -> Result<Planned<'c>, EngineError> {
        let graph = StepGraph::new(circuit);
        if !circuit.has_ordered_flow {
            return Err(EngineError::NoNextStep {
                circuit_id: circuit.id.clone(),
                step_id: step.id.clone(),
            });
        }
        self.require_complete(snapshot, document_id, step).await?;

        if graph.is_final(&step.id) {
            return Ok(Planned {
                kind: HistoryKind::Completed,
                from: Some(step),
                to: Target::Completed,
            });
        }
        let next =
            graph
                .next_step(step.order_index)
                .ok_or_else(|| EngineError::NoNextStep {
                    circuit_id: circuit.id.clone(),
                    step_id: step.id.clone(),
                })?;
        Ok(Planned {
            kind: HistoryKind::Advanced,
            from: Some(step),
            to: Target::Step(next),
        })
    }

    pub fn plan_return<'c>(
        &self,
        circuit: &'c Circuit,
        step: &'c Step,
    ) -> Result<Planned<'c>, EngineError> {
        if !circuit.allow_backtrack {
            return Err(EngineError::BacktrackDisabled {
                circuit_id: circuit.id.clone(),
            });
        }
        let previous = StepGraph::new(circuit)
            .previous_step(step.order_index)
            .ok_or_else(|| EngineError::NoPreviousStep {
                circuit_id: circuit.id.clone(),
                step_id: step.id.clone(),
            })?;
        Ok(Planned {
            kind: HistoryKind::Returned,
            from: Some(step),
            to: Target::Step(previous),
        })
    }

    /// Free flow: any other step. Ordered flow: the immediate neighbours only,
    /// forward through the completion gate and backward through the
    /// backtrack policy.
    pub async fn plan_move<'c>(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        circuit: &'c Circuit,
        step: &'c Step,
        target_step_id: &str,
    ) -> Result<Planned<'c>, EngineError> {
        let graph = StepGraph::new(circuit);
        let target = graph
            .step(target_step_id)
            .ok_or_else(|| EngineError::StepNotFound {
                circuit_id: circuit.id.clone(),
                step_id: target_step_id.to_string(),
            })?;
        if target.id == step.id {
            return Err(EngineError::invalid_transition(
                document_id,
                format!("document is already at step '{}'", step.id),
            ));
        }

        if circuit.has_ordered_flow {
            if !graph.is_adjacent(step, target) {
                return Err(EngineError::invalid_transition(
                    document_id,
                    format!(
                        "ordered circuit '{}' only allows moving to an adjacent step, not '{}'",
                        circuit.id, target.id
                    ),
                ));
            }
            if target.order_index > step.order_index {
                self.require_complete(snapshot, document_id, step).await?;
            } else if !circuit.allow_backtrack {
                return Err(EngineError::BacktrackDisabled {
                    circuit_id: circuit.id.clone(),
                });
            }
        }

        Ok(Planned {
            kind: HistoryKind::Moved,
            from: Some(step),
            to: Target::Step(target),
        })
    }

    /// Finish the circuit from its final step.
    pub async fn plan_complete<'c>(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        circuit: &'c Circuit,
        step: &'c Step,
    ) -> Result<Planned<'c>, EngineError> {
        if !StepGraph::new(circuit).is_final(&step.id) {
            return Err(EngineError::invalid_transition(
                document_id,
                format!("step '{}' is not the final step", step.id),
            ));
        }
        self.require_complete(snapshot, document_id, step).await?;
        Ok(Planned {
            kind: HistoryKind::Completed,
            from: Some(step),
            to: Target::Completed,
        })
    }

    async fn require_complete(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        step: &Step,
    ) -> Result<(), EngineError> {
        let missing = self
            .ledger
            .missing_required(snapshot, document_id, step)
            .await?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::StepIncomplete {
                document_id: document_id.to_string(),
                step_id: step.id.clone(),
                missing,
            })
        }
    }

    // ── Application ──────────────────────────────────────────────────────────

    /// Write a planned transition: workflow state, status seeding and exactly
    /// one history entry.
    pub async fn apply(
        &self,
        snapshot: &mut S::Snapshot,
        state: &WorkflowStateRecord,
        circuit: &Circuit,
        planned: Planned<'_>,
        actor_id: &str,
        comments: &str,
    ) -> Result<TransitionOutcome, EngineError> {
        let document_id = state.document_id.as_str();

        if planned.kind == HistoryKind::Assigned {
            self.ledger
                .reset_steps(snapshot, document_id, &circuit.steps)
                .await?;
        }

        let (current_step_id, status) = match planned.to {
            Target::Step(step) => {
                self.ledger.seed_step(snapshot, document_id, step).await?;
                (Some(step.id.clone()), WorkflowStatus::InProgress)
            }
            // The completed state keeps pointing at the step it finished on.
            Target::Completed => (
                planned.from.map(|s| s.id.clone()),
                WorkflowStatus::Completed,
            ),
        };

        let updated_at = now_rfc3339();
        let version = self
            .storage
            .update_workflow_state(
                snapshot,
                document_id,
                state.version,
                WorkflowStateUpdate {
                    circuit_id: Some(circuit.id.clone()),
                    current_step_id: current_step_id.clone(),
                    status,
                    updated_at: updated_at.clone(),
                },
            )
            .await?;

        let from_id = planned.from.map(|s| s.id.as_str());
        let draft = match planned.to {
            Target::Step(to) => HistoryDraft::transition(planned.kind, from_id, &to.id, comments),
            Target::Completed => HistoryDraft {
                kind: HistoryKind::Completed,
                step_id: from_id.unwrap_or_default().to_string(),
                from_step_id: from_id.map(str::to_string),
                to_step_id: None,
                action_id: None,
                status_id: None,
                comments: comments.to_string(),
                is_approved: true,
            },
        };
        let history = self
            .history
            .record(snapshot, document_id, actor_id, draft)
            .await?;

        let event = match (planned.to, planned.from) {
            (Target::Completed, _) => WorkflowEvent::CircuitCompleted {
                document_id: document_id.to_string(),
                circuit_id: circuit.id.clone(),
                actor_id: actor_id.to_string(),
            },
            (Target::Step(to), Some(from)) if planned.kind != HistoryKind::Assigned => {
                WorkflowEvent::StepChanged {
                    document_id: document_id.to_string(),
                    circuit_id: circuit.id.clone(),
                    from_step_id: from.id.clone(),
                    to_step_id: to.id.clone(),
                    actor_id: actor_id.to_string(),
                }
            }
            (Target::Step(to), _) => WorkflowEvent::CircuitAssigned {
                document_id: document_id.to_string(),
                circuit_id: circuit.id.clone(),
                step_id: to.id.clone(),
                actor_id: actor_id.to_string(),
            },
        };

        tracing::info!(
            document_id,
            circuit_id = %circuit.id,
            step_id = current_step_id.as_deref().unwrap_or_default(),
            kind = ?planned.kind,
            version,
            "workflow transition"
        );

        Ok(TransitionOutcome {
            state: WorkflowStateRecord {
                document_id: document_id.to_string(),
                circuit_id: Some(circuit.id.clone()),
                current_step_id,
                status,
                is_circuit_completed: status == WorkflowStatus::Completed,
                version,
                updated_at,
            },
            history,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NewCircuit, NewStep};
    use crate::types::Status;

    fn step(id: &str, order_index: i32) -> Step {
        Step {
            id: id.to_string(),
            circuit_id: "c".to_string(),
            title: id.to_string(),
            order_index,
            responsible_role: None,
            is_final_step: false,
            statuses: vec![Status {
                id: format!("{id}-ok"),
                step_id: id.to_string(),
                title: "ok".to_string(),
                is_required: true,
            }],
        }
    }

    fn circuit(ordered: bool, backtrack: bool) -> Circuit {
        Circuit {
            id: "c".to_string(),
            title: "C".to_string(),
            is_active: true,
            ever_activated: true,
            has_ordered_flow: ordered,
            allow_backtrack: backtrack,
            steps: vec![step("a", 0), step("b", 1), step("c", 2)],
        }
    }

    fn at(step_id: &str) -> WorkflowStateRecord {
        WorkflowStateRecord {
            document_id: "doc-1".to_string(),
            circuit_id: Some("c".to_string()),
            current_step_id: Some(step_id.to_string()),
            status: WorkflowStatus::InProgress,
            is_circuit_completed: false,
            version: 1,
            updated_at: now_rfc3339(),
        }
    }

    fn registry(active: bool) -> CircuitRegistry {
        let mut registry = CircuitRegistry::new();
        registry
            .create_circuit(NewCircuit {
                id: "c".to_string(),
                title: "C".to_string(),
                has_ordered_flow: true,
                allow_backtrack: true,
            })
            .unwrap();
        for (id, order_index) in [("a", 0), ("b", 1), ("c", 2)] {
            registry
                .add_step(
                    "c",
                    NewStep {
                        id: id.to_string(),
                        title: id.to_string(),
                        order_index,
                        responsible_role: None,
                        is_final_step: false,
                    },
                )
                .unwrap();
        }
        if active {
            registry.activate("c").unwrap();
        }
        registry
    }

    #[test]
    fn assign_requires_active_circuit() {
        let storage = circuit_storage::InMemoryStorage::new();
        let engine = TransitionEngine::new(&storage);
        let draft = WorkflowStateRecord::draft("doc-1", "now");

        assert!(matches!(
            engine.plan_assign(&registry(false), &draft, "c"),
            Err(EngineError::CircuitInactiveOrMissing { .. })
        ));
        let active = registry(true);
        assert!(matches!(
            engine.plan_assign(&active, &draft, "missing"),
            Err(EngineError::CircuitInactiveOrMissing { .. })
        ));

        let (circuit, planned) = engine.plan_assign(&active, &draft, "c").unwrap();
        assert_eq!(circuit.id, "c");
        assert!(matches!(planned.to, Target::Step(s) if s.id == "a"));
        assert!(matches!(
            engine.plan_assign(&active, &at("b"), "c"),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn assign_recovers_a_document_on_a_removed_step() {
        let storage = circuit_storage::InMemoryStorage::new();
        let engine = TransitionEngine::new(&storage);
        let mut registry = registry(true);
        registry.deactivate("c").unwrap();
        registry.remove_step("c", "b").unwrap();
        registry.activate("c").unwrap();

        let (_, planned) = engine.plan_assign(&registry, &at("b"), "c").unwrap();
        assert!(planned.from.is_none());
        assert!(matches!(planned.to, Target::Step(s) if s.id == "a"));
    }

    #[test]
    fn return_respects_backtrack_and_first_step() {
        let storage = circuit_storage::InMemoryStorage::new();
        let engine = TransitionEngine::new(&storage);

        let locked = circuit(true, false);
        assert_eq!(
            engine.plan_return(&locked, &locked.steps[1]).unwrap_err(),
            EngineError::BacktrackDisabled {
                circuit_id: "c".to_string()
            }
        );

        let open = circuit(true, true);
        assert!(matches!(
            engine.plan_return(&open, &open.steps[0]),
            Err(EngineError::NoPreviousStep { .. })
        ));
        let planned = engine.plan_return(&open, &open.steps[2]).unwrap();
        assert!(matches!(planned.to, Target::Step(s) if s.id == "b"));
    }

    #[test]
    fn current_position_reports_dangling_step() {
        let mut registry = CircuitRegistry::new();
        registry
            .create_circuit(crate::registry::NewCircuit {
                id: "c".to_string(),
                title: "C".to_string(),
                has_ordered_flow: true,
                allow_backtrack: true,
            })
            .unwrap();

        let err = current_position(&registry, &at("ghost")).unwrap_err();
        assert!(matches!(err, EngineError::DanglingReference { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Integrity);

        let err = current_position(
            &registry,
            &WorkflowStateRecord::draft("doc-1", "now"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NoCircuitAssigned { .. }));
    }
}
