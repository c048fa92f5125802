//! Circuit definitions and workflow positions.
//!
//! A `Circuit` is a workflow template: an ordered set of `Step`s, each owning
//! the `Status`es that must be completed before a document may leave it.
//! `Action`s are global and reference statuses by id through `StatusEffect`s.

use std::fmt;
use std::str::FromStr;

use circuit_storage::{WorkflowStateRecord, WorkflowStatus};
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Roles
// ──────────────────────────────────────────────

/// The role an actor holds. Resolved once at the identity boundary; the
/// rest of the engine only compares `Role` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "RoleRepr")]
pub enum Role {
    Administrator,
    Manager,
    Approver,
    Reviewer,
    Contributor,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Administrator,
        Role::Manager,
        Role::Approver,
        Role::Reviewer,
        Role::Contributor,
        Role::Viewer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Role::Administrator => "administrator",
            Role::Manager => "manager",
            Role::Approver => "approver",
            Role::Reviewer => "reviewer",
            Role::Contributor => "contributor",
            Role::Viewer => "viewer",
        }
    }

    /// Legacy numeric role id.
    pub fn code(self) -> u8 {
        match self {
            Role::Administrator => 1,
            Role::Manager => 2,
            Role::Approver => 3,
            Role::Reviewer => 4,
            Role::Contributor => 5,
            Role::Viewer => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.code() == code)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a role name or code is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Accepts a role name in any case or its numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Role::from_code(code).ok_or_else(|| UnknownRole(s.to_string()));
        }
        Role::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoleRepr {
    Code(u8),
    Name(String),
}

impl TryFrom<RoleRepr> for Role {
    type Error = UnknownRole;

    fn try_from(repr: RoleRepr) -> Result<Self, Self::Error> {
        match repr {
            RoleRepr::Code(code) => Role::from_code(code).ok_or(UnknownRole(code.to_string())),
            RoleRepr::Name(name) => name.parse(),
        }
    }
}

// ──────────────────────────────────────────────
// Circuit structure
// ──────────────────────────────────────────────

/// A named completion condition scoped to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub step_id: String,
    pub title: String,
    pub is_required: bool,
}

/// A stage in a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub circuit_id: String,
    pub title: String,
    /// Unique within the circuit; gaps are permitted.
    pub order_index: i32,
    /// Role authorized to act on this step. `None` = anyone.
    pub responsible_role: Option<Role>,
    pub is_final_step: bool,
    pub statuses: Vec<Status>,
}

impl Step {
    pub fn status(&self, status_id: &str) -> Option<&Status> {
        self.statuses.iter().find(|s| s.id == status_id)
    }

    pub fn required_statuses(&self) -> impl Iterator<Item = &Status> {
        self.statuses.iter().filter(|s| s.is_required)
    }
}

/// A workflow template.
///
/// `steps` is kept sorted by `order_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    pub id: String,
    pub title: String,
    /// Structural edits are refused while true.
    pub is_active: bool,
    /// Set on first activation; a circuit that was ever active can no
    /// longer be deleted.
    pub ever_activated: bool,
    pub has_ordered_flow: bool,
    pub allow_backtrack: bool,
    pub steps: Vec<Step>,
}

impl Circuit {
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Find a status anywhere in the circuit, with its owning step.
    pub fn status(&self, status_id: &str) -> Option<(&Step, &Status)> {
        self.steps
            .iter()
            .find_map(|step| step.status(status_id).map(|status| (step, status)))
    }
}

// ──────────────────────────────────────────────
// Actions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Approve,
    Reject,
}

impl ActionKind {
    pub fn is_approval(self) -> bool {
        matches!(self, ActionKind::Approve)
    }
}

/// Sets one status complete or incomplete when an action runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub status_id: String,
    pub sets_complete: bool,
}

/// A named operation applied to a document's current step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub title: String,
    pub kind: ActionKind,
    #[serde(default)]
    pub effects: Vec<StatusEffect>,
}

// ──────────────────────────────────────────────
// Workflow position
// ──────────────────────────────────────────────

/// Where a document sits in the workflow state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Position {
    Unassigned,
    AtStep { circuit_id: String, step_id: String },
    Completed { circuit_id: String },
}

impl Position {
    pub fn of(state: &WorkflowStateRecord) -> Position {
        match (&state.circuit_id, &state.current_step_id, state.status) {
            (Some(circuit_id), _, WorkflowStatus::Completed) => Position::Completed {
                circuit_id: circuit_id.clone(),
            },
            (Some(circuit_id), Some(step_id), _) => Position::AtStep {
                circuit_id: circuit_id.clone(),
                step_id: step_id.clone(),
            },
            _ => Position::Unassigned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_names_and_codes() {
        assert_eq!("Approver".parse::<Role>(), Ok(Role::Approver));
        assert_eq!(" reviewer ".parse::<Role>(), Ok(Role::Reviewer));
        assert_eq!("1".parse::<Role>(), Ok(Role::Administrator));
        assert!("7".parse::<Role>().is_err());
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn role_deserializes_from_either_representation() {
        #[derive(Deserialize)]
        struct Holder {
            role: Role,
        }
        let by_name: Holder = toml::from_str("role = \"manager\"").unwrap();
        let by_code: Holder = toml::from_str("role = 3").unwrap();
        assert_eq!(by_name.role, Role::Manager);
        assert_eq!(by_code.role, Role::Approver);
    }

    #[test]
    fn position_follows_state_record() {
        let mut state = WorkflowStateRecord::draft("doc-1", "2025-01-01T00:00:00Z");
        assert_eq!(Position::of(&state), Position::Unassigned);

        state.circuit_id = Some("c".to_string());
        state.current_step_id = Some("a".to_string());
        state.status = WorkflowStatus::InProgress;
        assert_eq!(
            Position::of(&state),
            Position::AtStep {
                circuit_id: "c".to_string(),
                step_id: "a".to_string()
            }
        );

        state.status = WorkflowStatus::Completed;
        assert_eq!(
            Position::of(&state),
            Position::Completed {
                circuit_id: "c".to_string()
            }
        );
    }
}
