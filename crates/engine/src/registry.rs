//! Structural administration of circuits, steps, statuses and actions.
//!
//! Every structural edit is refused while the owning circuit is active.
//! Deleting a circuit is only possible if it was never activated.

use std::collections::BTreeMap;

use crate::error::ErrorKind;
use crate::types::{Action, Circuit, Role, Status, Step};

/// Errors raised by structural edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("circuit not found: {circuit_id}")]
    CircuitNotFound { circuit_id: String },

    #[error("step '{step_id}' not found in circuit '{circuit_id}'")]
    StepNotFound { circuit_id: String, step_id: String },

    #[error("status '{status_id}' not found in circuit '{circuit_id}'")]
    StatusNotFound {
        circuit_id: String,
        status_id: String,
    },

    #[error("circuit '{circuit_id}' is active; deactivate it before editing its structure")]
    CircuitLocked { circuit_id: String },

    #[error("circuit '{circuit_id}' has been activated before and cannot be deleted")]
    CircuitEverActivated { circuit_id: String },

    #[error("order index {order_index} already used in circuit '{circuit_id}'")]
    DuplicateOrderIndex { circuit_id: String, order_index: i32 },

    #[error("duplicate {what} id '{id}'")]
    DuplicateId { what: &'static str, id: String },

    #[error("circuit '{circuit_id}' cannot be activated: {reason}")]
    InvalidStructure { circuit_id: String, reason: String },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::CircuitNotFound { .. }
            | RegistryError::StepNotFound { .. }
            | RegistryError::StatusNotFound { .. }
            | RegistryError::DuplicateId { .. }
            | RegistryError::InvalidStructure { .. } => ErrorKind::Validation,
            RegistryError::CircuitLocked { .. }
            | RegistryError::CircuitEverActivated { .. }
            | RegistryError::DuplicateOrderIndex { .. } => ErrorKind::State,
        }
    }
}

/// Attributes of a circuit being created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCircuit {
    pub id: String,
    pub title: String,
    pub has_ordered_flow: bool,
    pub allow_backtrack: bool,
}

/// Attributes of a step being added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStep {
    pub id: String,
    pub title: String,
    pub order_index: i32,
    pub responsible_role: Option<Role>,
    pub is_final_step: bool,
}

/// Partial update of a step. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepPatch {
    pub title: Option<String>,
    pub order_index: Option<i32>,
    pub responsible_role: Option<Option<Role>>,
    pub is_final_step: Option<bool>,
}

/// Attributes of a status being added to a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStatus {
    pub id: String,
    pub title: String,
    pub is_required: bool,
}

/// In-memory catalogue of circuit templates and actions.
#[derive(Debug, Clone, Default)]
pub struct CircuitRegistry {
    circuits: BTreeMap<String, Circuit>,
    actions: BTreeMap<String, Action>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn circuit(&self, circuit_id: &str) -> Option<&Circuit> {
        self.circuits.get(circuit_id)
    }

    pub fn circuits(&self) -> impl Iterator<Item = &Circuit> {
        self.circuits.values()
    }

    pub fn action(&self, action_id: &str) -> Option<&Action> {
        self.actions.get(action_id)
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    // ── Circuits ─────────────────────────────────────────────────────────────

    pub fn create_circuit(&mut self, new: NewCircuit) -> Result<&Circuit, RegistryError> {
        if self.circuits.contains_key(&new.id) {
            return Err(RegistryError::DuplicateId {
                what: "circuit",
                id: new.id,
            });
        }
        let circuit = Circuit {
            id: new.id.clone(),
            title: new.title,
            is_active: false,
            ever_activated: false,
            has_ordered_flow: new.has_ordered_flow,
            allow_backtrack: new.allow_backtrack,
            steps: Vec::new(),
        };
        Ok(self.circuits.entry(new.id).or_insert(circuit))
    }

    /// Remove a never-activated circuit together with its steps and statuses.
    pub fn delete_circuit(&mut self, circuit_id: &str) -> Result<Circuit, RegistryError> {
        let circuit = self.get(circuit_id)?;
        if circuit.ever_activated {
            return Err(RegistryError::CircuitEverActivated {
                circuit_id: circuit_id.to_string(),
            });
        }
        self.circuits
            .remove(circuit_id)
            .ok_or_else(|| RegistryError::CircuitNotFound {
                circuit_id: circuit_id.to_string(),
            })
    }

    pub fn update_policy(
        &mut self,
        circuit_id: &str,
        has_ordered_flow: bool,
        allow_backtrack: bool,
    ) -> Result<&Circuit, RegistryError> {
        let circuit = self.editable(circuit_id)?;
        circuit.has_ordered_flow = has_ordered_flow;
        circuit.allow_backtrack = allow_backtrack;
        Ok(circuit)
    }

    /// Lock the circuit's structure and make it assignable.
    ///
    /// Requires at least one step and at most one step flagged final.
    pub fn activate(&mut self, circuit_id: &str) -> Result<&Circuit, RegistryError> {
        let circuit = self.get_mut(circuit_id)?;
        if circuit.steps.is_empty() {
            return Err(RegistryError::InvalidStructure {
                circuit_id: circuit_id.to_string(),
                reason: "circuit has no steps".to_string(),
            });
        }
        let flagged = circuit.steps.iter().filter(|s| s.is_final_step).count();
        if flagged > 1 {
            return Err(RegistryError::InvalidStructure {
                circuit_id: circuit_id.to_string(),
                reason: format!("{flagged} steps are flagged final, at most one is allowed"),
            });
        }
        circuit.is_active = true;
        circuit.ever_activated = true;
        Ok(circuit)
    }

    pub fn deactivate(&mut self, circuit_id: &str) -> Result<&Circuit, RegistryError> {
        let circuit = self.get_mut(circuit_id)?;
        circuit.is_active = false;
        Ok(circuit)
    }

    // ── Steps ────────────────────────────────────────────────────────────────

    pub fn add_step(&mut self, circuit_id: &str, new: NewStep) -> Result<&Step, RegistryError> {
        let circuit = self.editable(circuit_id)?;
        if circuit.step(&new.id).is_some() {
            return Err(RegistryError::DuplicateId {
                what: "step",
                id: new.id,
            });
        }
        ensure_order_free(circuit, new.order_index, None)?;

        circuit.steps.push(Step {
            id: new.id.clone(),
            circuit_id: circuit_id.to_string(),
            title: new.title,
            order_index: new.order_index,
            responsible_role: new.responsible_role,
            is_final_step: new.is_final_step,
            statuses: Vec::new(),
        });
        circuit.steps.sort_by_key(|s| s.order_index);
        find_step(circuit, &new.id)
    }

    pub fn update_step(
        &mut self,
        circuit_id: &str,
        step_id: &str,
        patch: StepPatch,
    ) -> Result<&Step, RegistryError> {
        let circuit = self.editable(circuit_id)?;
        find_step(circuit, step_id)?;
        if let Some(order_index) = patch.order_index {
            ensure_order_free(circuit, order_index, Some(step_id))?;
        }

        let step = find_step_mut(circuit, step_id)?;
        if let Some(title) = patch.title {
            step.title = title;
        }
        if let Some(order_index) = patch.order_index {
            step.order_index = order_index;
        }
        if let Some(role) = patch.responsible_role {
            step.responsible_role = role;
        }
        if let Some(is_final) = patch.is_final_step {
            step.is_final_step = is_final;
        }
        circuit.steps.sort_by_key(|s| s.order_index);
        find_step(circuit, step_id)
    }

    pub fn remove_step(&mut self, circuit_id: &str, step_id: &str) -> Result<Step, RegistryError> {
        let circuit = self.editable(circuit_id)?;
        let pos = circuit
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or_else(|| RegistryError::StepNotFound {
                circuit_id: circuit_id.to_string(),
                step_id: step_id.to_string(),
            })?;
        Ok(circuit.steps.remove(pos))
    }

    // ── Statuses ─────────────────────────────────────────────────────────────

    /// Status ids are unique across the whole circuit.
    pub fn add_status(
        &mut self,
        circuit_id: &str,
        step_id: &str,
        new: NewStatus,
    ) -> Result<&Status, RegistryError> {
        let circuit = self.editable(circuit_id)?;
        if circuit.status(&new.id).is_some() {
            return Err(RegistryError::DuplicateId {
                what: "status",
                id: new.id,
            });
        }
        let step = find_step_mut(circuit, step_id)?;
        step.statuses.push(Status {
            id: new.id,
            step_id: step_id.to_string(),
            title: new.title,
            is_required: new.is_required,
        });
        let last = step.statuses.len() - 1;
        Ok(&step.statuses[last])
    }

    pub fn remove_status(
        &mut self,
        circuit_id: &str,
        status_id: &str,
    ) -> Result<Status, RegistryError> {
        let circuit = self.editable(circuit_id)?;
        for step in &mut circuit.steps {
            if let Some(pos) = step.statuses.iter().position(|s| s.id == status_id) {
                return Ok(step.statuses.remove(pos));
            }
        }
        Err(RegistryError::StatusNotFound {
            circuit_id: circuit_id.to_string(),
            status_id: status_id.to_string(),
        })
    }

    // ── Actions ──────────────────────────────────────────────────────────────

    pub fn register_action(&mut self, action: Action) -> Result<&Action, RegistryError> {
        if self.actions.contains_key(&action.id) {
            return Err(RegistryError::DuplicateId {
                what: "action",
                id: action.id,
            });
        }
        let id = action.id.clone();
        Ok(self.actions.entry(id).or_insert(action))
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn get(&self, circuit_id: &str) -> Result<&Circuit, RegistryError> {
        self.circuits
            .get(circuit_id)
            .ok_or_else(|| RegistryError::CircuitNotFound {
                circuit_id: circuit_id.to_string(),
            })
    }

    fn get_mut(&mut self, circuit_id: &str) -> Result<&mut Circuit, RegistryError> {
        self.circuits
            .get_mut(circuit_id)
            .ok_or_else(|| RegistryError::CircuitNotFound {
                circuit_id: circuit_id.to_string(),
            })
    }

    fn editable(&mut self, circuit_id: &str) -> Result<&mut Circuit, RegistryError> {
        let circuit = self.get_mut(circuit_id)?;
        if circuit.is_active {
            return Err(RegistryError::CircuitLocked {
                circuit_id: circuit_id.to_string(),
            });
        }
        Ok(circuit)
    }
}

fn ensure_order_free(
    circuit: &Circuit,
    order_index: i32,
    except_step: Option<&str>,
) -> Result<(), RegistryError> {
    let taken = circuit
        .steps
        .iter()
        .any(|s| s.order_index == order_index && Some(s.id.as_str()) != except_step);
    if taken {
        return Err(RegistryError::DuplicateOrderIndex {
            circuit_id: circuit.id.clone(),
            order_index,
        });
    }
    Ok(())
}

fn find_step<'a>(circuit: &'a Circuit, step_id: &str) -> Result<&'a Step, RegistryError> {
    circuit
        .step(step_id)
        .ok_or_else(|| RegistryError::StepNotFound {
            circuit_id: circuit.id.clone(),
            step_id: step_id.to_string(),
        })
}

fn find_step_mut<'a>(
    circuit: &'a mut Circuit,
    step_id: &str,
) -> Result<&'a mut Step, RegistryError> {
    let circuit_id = circuit.id.clone();
    circuit
        .steps
        .iter_mut()
        .find(|s| s.id == step_id)
        .ok_or(RegistryError::StepNotFound {
            circuit_id,
            step_id: step_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_step(id: &str, order_index: i32) -> NewStep {
        NewStep {
            id: id.to_string(),
            title: id.to_string(),
            order_index,
            responsible_role: None,
            is_final_step: false,
        }
    }

    fn registry_with_circuit() -> CircuitRegistry {
        let mut reg = CircuitRegistry::new();
        reg.create_circuit(NewCircuit {
            id: "c".to_string(),
            title: "Contracts".to_string(),
            has_ordered_flow: true,
            allow_backtrack: false,
        })
        .unwrap();
        reg
    }

    #[test]
    fn steps_are_kept_in_order_index_order() {
        let mut reg = registry_with_circuit();
        reg.add_step("c", new_step("b", 20)).unwrap();
        reg.add_step("c", new_step("a", 10)).unwrap();
        reg.add_step("c", new_step("z", 30)).unwrap();
        let ids: Vec<_> = reg.circuit("c").unwrap().steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "z"]);
    }

    #[test]
    fn duplicate_order_index_rejected() {
        let mut reg = registry_with_circuit();
        reg.add_step("c", new_step("a", 1)).unwrap();
        let err = reg.add_step("c", new_step("b", 1)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateOrderIndex {
                circuit_id: "c".to_string(),
                order_index: 1
            }
        );
    }

    #[test]
    fn update_step_may_keep_its_own_order_index() {
        let mut reg = registry_with_circuit();
        reg.add_step("c", new_step("a", 1)).unwrap();
        reg.add_step("c", new_step("b", 2)).unwrap();
        let patch = StepPatch {
            title: Some("Review".to_string()),
            order_index: Some(1),
            ..StepPatch::default()
        };
        assert_eq!(reg.update_step("c", "a", patch).unwrap().title, "Review");

        let clash = StepPatch {
            order_index: Some(2),
            ..StepPatch::default()
        };
        assert!(matches!(
            reg.update_step("c", "a", clash),
            Err(RegistryError::DuplicateOrderIndex { .. })
        ));
    }

    #[test]
    fn active_circuit_locks_structure() {
        let mut reg = registry_with_circuit();
        reg.add_step("c", new_step("a", 0)).unwrap();
        reg.activate("c").unwrap();

        let locked = RegistryError::CircuitLocked {
            circuit_id: "c".to_string(),
        };
        assert_eq!(reg.add_step("c", new_step("b", 1)).unwrap_err(), locked);
        assert_eq!(
            reg.update_step("c", "a", StepPatch::default()).unwrap_err(),
            locked
        );
        assert_eq!(reg.remove_step("c", "a").unwrap_err(), locked);
        assert_eq!(
            reg.add_status(
                "c",
                "a",
                NewStatus {
                    id: "s".to_string(),
                    title: "S".to_string(),
                    is_required: true
                }
            )
            .unwrap_err(),
            locked
        );
        assert_eq!(reg.update_policy("c", false, true).unwrap_err(), locked);
        assert_eq!(locked.kind(), ErrorKind::State);

        reg.deactivate("c").unwrap();
        reg.add_step("c", new_step("b", 1)).unwrap();
    }

    #[test]
    fn activation_requires_steps_and_single_final() {
        let mut reg = registry_with_circuit();
        assert!(matches!(
            reg.activate("c"),
            Err(RegistryError::InvalidStructure { .. })
        ));

        let mut a = new_step("a", 0);
        a.is_final_step = true;
        let mut b = new_step("b", 1);
        b.is_final_step = true;
        reg.add_step("c", a).unwrap();
        reg.add_step("c", b).unwrap();
        assert!(matches!(
            reg.activate("c"),
            Err(RegistryError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn delete_cascades_only_before_first_activation() {
        let mut reg = registry_with_circuit();
        reg.add_step("c", new_step("a", 0)).unwrap();
        let removed = reg.delete_circuit("c").unwrap();
        assert_eq!(removed.steps.len(), 1);
        assert!(reg.circuit("c").is_none());

        let mut reg = registry_with_circuit();
        reg.add_step("c", new_step("a", 0)).unwrap();
        reg.activate("c").unwrap();
        reg.deactivate("c").unwrap();
        assert_eq!(
            reg.delete_circuit("c").unwrap_err(),
            RegistryError::CircuitEverActivated {
                circuit_id: "c".to_string()
            }
        );
    }

    #[test]
    fn status_ids_unique_across_circuit() {
        let mut reg = registry_with_circuit();
        reg.add_step("c", new_step("a", 0)).unwrap();
        reg.add_step("c", new_step("b", 1)).unwrap();
        let status = |id: &str| NewStatus {
            id: id.to_string(),
            title: id.to_string(),
            is_required: true,
        };
        reg.add_status("c", "a", status("signed")).unwrap();
        assert!(matches!(
            reg.add_status("c", "b", status("signed")),
            Err(RegistryError::DuplicateId { what: "status", .. })
        ));
        let removed = reg.remove_status("c", "signed").unwrap();
        assert_eq!(removed.step_id, "a");
    }
}
