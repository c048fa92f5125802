use serde::{Deserialize, Serialize};

/// A document registered with the workflow store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub created_by: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
}

/// Overall workflow status of a document.
///
/// The numeric codes match the ones exposed to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    InProgress,
    Completed,
}

impl WorkflowStatus {
    pub fn code(self) -> u8 {
        match self {
            WorkflowStatus::Draft => 0,
            WorkflowStatus::InProgress => 1,
            WorkflowStatus::Completed => 2,
        }
    }
}

/// A snapshot of a document's position in its circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStateRecord {
    pub document_id: String,
    pub circuit_id: Option<String>,
    pub current_step_id: Option<String>,
    pub status: WorkflowStatus,
    pub is_circuit_completed: bool,
    pub version: i64,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
}

impl WorkflowStateRecord {
    /// The state a freshly registered document starts in.
    pub fn draft(document_id: &str, updated_at: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            circuit_id: None,
            current_step_id: None,
            status: WorkflowStatus::Draft,
            is_circuit_completed: false,
            version: 0,
            updated_at: updated_at.to_string(),
        }
    }
}

/// The mutable part of a workflow state, written by `update_workflow_state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStateUpdate {
    pub circuit_id: Option<String>,
    pub current_step_id: Option<String>,
    pub status: WorkflowStatus,
    pub updated_at: String,
}

/// Per (document, status) completion record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatusRecord {
    pub document_id: String,
    pub status_id: String,
    pub step_id: String,
    pub is_complete: bool,
    pub completed_by: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string. None while incomplete.
    pub completed_at: Option<String>,
}

/// What produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Assigned,
    Action,
    Advanced,
    Returned,
    Moved,
    Completed,
    StatusChanged,
}

/// An immutable audit record. Written once, never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub document_id: String,
    pub kind: HistoryKind,
    pub step_id: String,
    pub from_step_id: Option<String>,
    pub to_step_id: Option<String>,
    pub action_id: Option<String>,
    pub status_id: Option<String>,
    pub processed_by: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub processed_at: String,
    pub comments: String,
    pub is_approved: bool,
}
