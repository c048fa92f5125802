//! Workflow configuration file format.
//!
//! A configuration declares the actor table, the global actions and the
//! circuit templates the engine starts with.
//!
//! # Example
//!
//! ```toml
//! [actors]
//! alice = "manager"
//! bob = 3            # legacy numeric role id
//!
//! [[actions]]
//! id = "approve-legal"
//! title = "Approve (legal)"
//! kind = "approve"
//! effects = [{ status_id = "legal-ok", sets_complete = true }]
//!
//! [[circuits]]
//! id = "contract"
//! title = "Contract approval"
//! ordered_flow = true
//! allow_backtrack = false
//!
//! [[circuits.steps]]
//! id = "legal"
//! title = "Legal review"
//! order_index = 0
//! responsible_role = "approver"
//! statuses = [{ id = "legal-ok", title = "Legal sign-off" }]
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::identity::StaticRoleProvider;
use crate::registry::{CircuitRegistry, NewCircuit, NewStatus, NewStep, RegistryError};
use crate::types::{Action, Role};

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Actor id to role.
    #[serde(default)]
    pub actors: BTreeMap<String, Role>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub circuits: Vec<CircuitConfig>,
}

/// `[[circuits]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub id: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub ordered_flow: bool,
    #[serde(default)]
    pub allow_backtrack: bool,
    /// Activate the circuit once it is built.
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    pub id: String,
    pub title: String,
    pub order_index: i32,
    pub responsible_role: Option<Role>,
    #[serde(default)]
    pub final_step: bool,
    #[serde(default)]
    pub statuses: Vec<StatusConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusConfig {
    pub id: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("action '{action_id}' references unknown status '{status_id}'")]
    UnknownEffectStatus { action_id: String, status_id: String },
}

// ── Functions ─────────────────────────────────────────────────────────────────

impl WorkflowConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Build a registry from the declared circuits and actions, activating
    /// circuits marked active. Structural problems surface as the registry
    /// error that rejected them.
    pub fn build_registry(&self) -> Result<CircuitRegistry, ConfigError> {
        let mut registry = CircuitRegistry::new();

        for circuit in &self.circuits {
            registry.create_circuit(NewCircuit {
                id: circuit.id.clone(),
                title: circuit.title.clone(),
                has_ordered_flow: circuit.ordered_flow,
                allow_backtrack: circuit.allow_backtrack,
            })?;
            for step in &circuit.steps {
                registry.add_step(
                    &circuit.id,
                    NewStep {
                        id: step.id.clone(),
                        title: step.title.clone(),
                        order_index: step.order_index,
                        responsible_role: step.responsible_role,
                        is_final_step: step.final_step,
                    },
                )?;
                for status in &step.statuses {
                    registry.add_status(
                        &circuit.id,
                        &step.id,
                        NewStatus {
                            id: status.id.clone(),
                            title: status.title.clone(),
                            is_required: status.required,
                        },
                    )?;
                }
            }
        }

        for action in &self.actions {
            for effect in &action.effects {
                if !registry
                    .circuits()
                    .any(|c| c.status(&effect.status_id).is_some())
                {
                    return Err(ConfigError::UnknownEffectStatus {
                        action_id: action.id.clone(),
                        status_id: effect.status_id.clone(),
                    });
                }
            }
            registry.register_action(action.clone())?;
        }

        for circuit in self.circuits.iter().filter(|c| c.active) {
            registry.activate(&circuit.id)?;
        }

        tracing::debug!(
            circuits = self.circuits.len(),
            actions = self.actions.len(),
            "registry built from configuration"
        );
        Ok(registry)
    }

    pub fn role_provider(&self) -> StaticRoleProvider {
        self.actors
            .iter()
            .map(|(actor, role)| (actor.clone(), *role))
            .collect()
    }
}
