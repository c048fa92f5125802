//! Outbound workflow notifications.
//!
//! Events are emitted after a successful commit, on a background task, once
//! the document lock is released. Delivery is best effort: a failing or slow
//! sink is logged and never fails or delays the operation that produced the
//! event.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    CircuitAssigned {
        document_id: String,
        circuit_id: String,
        step_id: String,
        actor_id: String,
    },
    ActionProcessed {
        document_id: String,
        step_id: String,
        action_id: String,
        is_approved: bool,
        actor_id: String,
    },
    StepChanged {
        document_id: String,
        circuit_id: String,
        from_step_id: String,
        to_step_id: String,
        actor_id: String,
    },
    CircuitCompleted {
        document_id: String,
        circuit_id: String,
        actor_id: String,
    },
    StatusChanged {
        document_id: String,
        status_id: String,
        is_complete: bool,
        actor_id: String,
    },
}

impl WorkflowEvent {
    pub fn document_id(&self) -> &str {
        match self {
            WorkflowEvent::CircuitAssigned { document_id, .. }
            | WorkflowEvent::ActionProcessed { document_id, .. }
            | WorkflowEvent::StepChanged { document_id, .. }
            | WorkflowEvent::CircuitCompleted { document_id, .. }
            | WorkflowEvent::StatusChanged { document_id, .. } => document_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &WorkflowEvent) -> Result<(), NotifyError>;
}

/// Writes every event to the `tracing` log as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, event: &WorkflowEvent) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(event).map_err(|e| NotifyError::Delivery(e.to_string()))?;
        tracing::info!(
            target: "circuit::events",
            document_id = event.document_id(),
            %payload,
            "workflow event"
        );
        Ok(())
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn notify(&self, event: &WorkflowEvent) -> Result<(), NotifyError> {
        self.tx.send(event.clone()).map_err(|_| NotifyError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed() -> WorkflowEvent {
        WorkflowEvent::CircuitCompleted {
            document_id: "doc-1".to_string(),
            circuit_id: "c".to_string(),
            actor_id: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn channel_sink_delivers_and_reports_closed() {
        let (sink, mut rx) = ChannelSink::new();
        sink.notify(&completed()).await.unwrap();
        assert_eq!(rx.recv().await, Some(completed()));

        drop(rx);
        assert_eq!(sink.notify(&completed()).await, Err(NotifyError::Closed));
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(completed()).unwrap();
        assert_eq!(json["event"], "circuit_completed");
        assert_eq!(json["document_id"], "doc-1");
    }
}
