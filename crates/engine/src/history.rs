//! Append-only audit log of workflow events.

use circuit_storage::{HistoryKind, HistoryRecord, WorkflowStorage};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::EngineError;

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Everything about a history entry except its id and timestamp.
#[derive(Debug, Clone)]
pub struct HistoryDraft {
    pub kind: HistoryKind,
    pub step_id: String,
    pub from_step_id: Option<String>,
    pub to_step_id: Option<String>,
    pub action_id: Option<String>,
    pub status_id: Option<String>,
    pub comments: String,
    pub is_approved: bool,
}

impl HistoryDraft {
    /// A step-to-step (or step-to-completion) transition entry.
    pub fn transition(kind: HistoryKind, from: Option<&str>, to: &str, comments: &str) -> Self {
        Self {
            kind,
            step_id: to.to_string(),
            from_step_id: from.map(str::to_string),
            to_step_id: Some(to.to_string()),
            action_id: None,
            status_id: None,
            comments: comments.to_string(),
            is_approved: true,
        }
    }
}

/// Writes history entries into a storage snapshot.
pub struct HistoryRecorder<'a, S: WorkflowStorage> {
    storage: &'a S,
}

impl<'a, S: WorkflowStorage> HistoryRecorder<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    pub async fn record(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        actor_id: &str,
        draft: HistoryDraft,
    ) -> Result<HistoryRecord, EngineError> {
        let record = HistoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            kind: draft.kind,
            step_id: draft.step_id,
            from_step_id: draft.from_step_id,
            to_step_id: draft.to_step_id,
            action_id: draft.action_id,
            status_id: draft.status_id,
            processed_by: actor_id.to_string(),
            processed_at: now_rfc3339(),
            comments: draft.comments,
            is_approved: draft.is_approved,
        };
        self.storage
            .insert_history(snapshot, record.clone())
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_rfc3339() {
        let ts = now_rfc3339();
        assert!(OffsetDateTime::parse(&ts, &Rfc3339).is_ok(), "{ts}");
    }

    #[test]
    fn transition_draft_points_at_destination() {
        let draft = HistoryDraft::transition(HistoryKind::Advanced, Some("a"), "b", "ok");
        assert_eq!(draft.step_id, "b");
        assert_eq!(draft.from_step_id.as_deref(), Some("a"));
        assert_eq!(draft.to_step_id.as_deref(), Some("b"));
        assert!(draft.action_id.is_none());
    }
}
