use std::fmt;

use circuit_storage::StorageError;
use serde::Serialize;

use crate::types::Role;

/// Broad classification of an [`EngineError`], used by callers to decide how
/// to surface it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request is inconsistent with current state; the caller may retry
    /// with corrected input.
    Validation,
    /// The actor may not perform this operation.
    Authorization,
    /// The operation does not apply to the document's current state.
    State,
    /// Data corruption, storage failure or a lost concurrent update.
    Integrity,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::State => "state",
            ErrorKind::Integrity => "integrity",
        })
    }
}

/// All errors returned by workflow operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    // ── Validation ───────────────────────────────────────────────────────────
    #[error("step '{step_id}' of document '{document_id}' has incomplete required statuses: {}", missing.join(", "))]
    StepIncomplete {
        document_id: String,
        step_id: String,
        missing: Vec<String>,
    },

    #[error("invalid transition for document '{document_id}': {reason}")]
    InvalidTransition { document_id: String, reason: String },

    #[error("status '{status_id}' does not belong to current step '{step_id}'")]
    InvalidStatus { status_id: String, step_id: String },

    #[error("document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("document already registered: {document_id}")]
    DocumentExists { document_id: String },

    #[error("action not found: {action_id}")]
    ActionNotFound { action_id: String },

    #[error("step '{step_id}' not found in circuit '{circuit_id}'")]
    StepNotFound { circuit_id: String, step_id: String },

    // ── Authorization ────────────────────────────────────────────────────────
    #[error("actor '{actor_id}' with role '{role}' may not act on step '{step_id}' (requires '{required}')")]
    UnauthorizedRole {
        actor_id: String,
        role: Role,
        step_id: String,
        required: Role,
    },

    #[error("unknown actor: {actor_id}")]
    UnknownActor { actor_id: String },

    // ── State ────────────────────────────────────────────────────────────────
    #[error("document '{document_id}' has already completed its circuit")]
    CircuitCompleted { document_id: String },

    #[error("circuit '{circuit_id}' is missing, inactive or has no steps")]
    CircuitInactiveOrMissing { circuit_id: String },

    #[error("document '{document_id}' is not assigned to a circuit")]
    NoCircuitAssigned { document_id: String },

    #[error("circuit '{circuit_id}' does not allow returning to a previous step")]
    BacktrackDisabled { circuit_id: String },

    #[error("no next step after '{step_id}' in circuit '{circuit_id}'")]
    NoNextStep { circuit_id: String, step_id: String },

    #[error("no step before '{step_id}' in circuit '{circuit_id}'")]
    NoPreviousStep { circuit_id: String, step_id: String },

    // ── Integrity ────────────────────────────────────────────────────────────
    #[error("status not found: {status_id}")]
    StatusNotFound { status_id: String },

    #[error("document '{document_id}' references missing {reference}")]
    DanglingReference {
        document_id: String,
        reference: String,
    },

    #[error("document '{document_id}' was modified concurrently")]
    ConcurrentModification { document_id: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("identity provider unavailable: {0}")]
    IdentityUnavailable(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::StepIncomplete { .. }
            | EngineError::InvalidTransition { .. }
            | EngineError::InvalidStatus { .. }
            | EngineError::DocumentNotFound { .. }
            | EngineError::DocumentExists { .. }
            | EngineError::ActionNotFound { .. }
            | EngineError::StepNotFound { .. } => ErrorKind::Validation,

            EngineError::UnauthorizedRole { .. } | EngineError::UnknownActor { .. } => {
                ErrorKind::Authorization
            }

            EngineError::CircuitCompleted { .. }
            | EngineError::CircuitInactiveOrMissing { .. }
            | EngineError::NoCircuitAssigned { .. }
            | EngineError::BacktrackDisabled { .. }
            | EngineError::NoNextStep { .. }
            | EngineError::NoPreviousStep { .. } => ErrorKind::State,

            EngineError::StatusNotFound { .. }
            | EngineError::DanglingReference { .. }
            | EngineError::ConcurrentModification { .. }
            | EngineError::Storage(_)
            | EngineError::IdentityUnavailable(_) => ErrorKind::Integrity,
        }
    }

    pub(crate) fn invalid_transition(document_id: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidTransition {
            document_id: document_id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::DocumentNotFound { document_id } => {
                EngineError::DocumentNotFound { document_id }
            }
            StorageError::DocumentExists { document_id } => {
                EngineError::DocumentExists { document_id }
            }
            StorageError::ConcurrentConflict { document_id, .. } => {
                EngineError::ConcurrentModification { document_id }
            }
            other => EngineError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_engine_kinds() {
        let missing: EngineError = StorageError::DocumentNotFound {
            document_id: "d".to_string(),
        }
        .into();
        assert_eq!(missing.kind(), ErrorKind::Validation);

        let conflict: EngineError = StorageError::ConcurrentConflict {
            document_id: "d".to_string(),
            expected_version: 3,
        }
        .into();
        assert_eq!(conflict.kind(), ErrorKind::Integrity);

        let backend: EngineError = StorageError::Backend("disk full".to_string()).into();
        assert_eq!(backend, EngineError::Storage("storage backend error: disk full".to_string()));
    }

    #[test]
    fn step_incomplete_lists_missing_statuses() {
        let e = EngineError::StepIncomplete {
            document_id: "doc-1".to_string(),
            step_id: "review".to_string(),
            missing: vec!["legal".to_string(), "finance".to_string()],
        };
        assert!(e.to_string().ends_with("legal, finance"));
        assert_eq!(e.kind(), ErrorKind::Validation);
    }
}
