//! Per-document completion tracking of step statuses.
//!
//! Rows are created lazily when a document enters a step and are only ever
//! updated afterwards. Writing the value a row already holds leaves the row
//! untouched, so repeated effects converge.

use circuit_storage::{DocumentStatusRecord, WorkflowStorage};

use crate::error::EngineError;
use crate::history::now_rfc3339;
use crate::types::{Status, StatusEffect, Step};

/// Required statuses of `step` that are not complete in `rows`.
pub fn missing_required(step: &Step, rows: &[DocumentStatusRecord]) -> Vec<String> {
    step.required_statuses()
        .filter(|status| {
            !rows
                .iter()
                .any(|row| row.status_id == status.id && row.is_complete)
        })
        .map(|status| status.id.clone())
        .collect()
}

/// Reads and writes DocumentStatus rows inside a storage snapshot.
pub struct StatusLedger<'a, S: WorkflowStorage> {
    storage: &'a S,
}

impl<'a, S: WorkflowStorage> StatusLedger<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    pub async fn rows(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
    ) -> Result<Vec<DocumentStatusRecord>, EngineError> {
        Ok(self
            .storage
            .get_document_statuses_for_update(snapshot, document_id)
            .await?)
    }

    /// True iff every required status of `step` is complete for the document.
    /// A step without required statuses is trivially complete.
    pub async fn is_step_complete(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        step: &Step,
    ) -> Result<bool, EngineError> {
        Ok(self
            .missing_required(snapshot, document_id, step)
            .await?
            .is_empty())
    }

    pub async fn missing_required(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        step: &Step,
    ) -> Result<Vec<String>, EngineError> {
        let rows = self.rows(snapshot, document_id).await?;
        Ok(missing_required(step, &rows))
    }

    /// Create an incomplete row for every status of `step` that has none yet.
    pub async fn seed_step(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        step: &Step,
    ) -> Result<(), EngineError> {
        let rows = self.rows(snapshot, document_id).await?;
        for status in &step.statuses {
            if rows.iter().any(|r| r.status_id == status.id) {
                continue;
            }
            self.storage
                .upsert_document_status(
                    snapshot,
                    DocumentStatusRecord {
                        document_id: document_id.to_string(),
                        status_id: status.id.clone(),
                        step_id: step.id.clone(),
                        is_complete: false,
                        completed_by: None,
                        completed_at: None,
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Reset every existing row of `steps` to incomplete. Used when a
    /// document starts a fresh run through a circuit.
    pub async fn reset_steps<'s>(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        steps: impl IntoIterator<Item = &'s Step>,
    ) -> Result<(), EngineError> {
        let rows = self.rows(snapshot, document_id).await?;
        for step in steps {
            for status in &step.statuses {
                let existing = rows.iter().find(|r| r.status_id == status.id);
                if existing.is_some_and(|r| r.is_complete) {
                    self.write(snapshot, document_id, step, status, false, None)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Apply an action's effects to statuses of the document's current step.
    ///
    /// Every effect is validated before any row is written; a status outside
    /// `step` fails the whole call with `InvalidStatus`.
    pub async fn apply_status_effects(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        step: &Step,
        effects: &[StatusEffect],
        actor_id: &str,
    ) -> Result<Vec<DocumentStatusRecord>, EngineError> {
        let mut targets = Vec::with_capacity(effects.len());
        for effect in effects {
            let status = step
                .status(&effect.status_id)
                .ok_or_else(|| EngineError::InvalidStatus {
                    status_id: effect.status_id.clone(),
                    step_id: step.id.clone(),
                })?;
            targets.push((status, effect.sets_complete));
        }

        let mut written = Vec::with_capacity(targets.len());
        for (status, complete) in targets {
            written.push(
                self.set_status(snapshot, document_id, step, status, complete, actor_id)
                    .await?,
            );
        }
        Ok(written)
    }

    /// Set a single status. Returns the row as it stands afterwards.
    pub async fn set_status(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        step: &Step,
        status: &Status,
        is_complete: bool,
        actor_id: &str,
    ) -> Result<DocumentStatusRecord, EngineError> {
        let rows = self.rows(snapshot, document_id).await?;
        let existing = rows.iter().find(|r| r.status_id == status.id);
        if let Some(row) = existing {
            if row.is_complete == is_complete {
                return Ok(row.clone());
            }
        }
        self.write(snapshot, document_id, step, status, is_complete, Some(actor_id))
            .await
    }

    async fn write(
        &self,
        snapshot: &mut S::Snapshot,
        document_id: &str,
        step: &Step,
        status: &Status,
        is_complete: bool,
        actor_id: Option<&str>,
    ) -> Result<DocumentStatusRecord, EngineError> {
        let record = DocumentStatusRecord {
            document_id: document_id.to_string(),
            status_id: status.id.clone(),
            step_id: step.id.clone(),
            is_complete,
            completed_by: if is_complete {
                actor_id.map(str::to_string)
            } else {
                None
            },
            completed_at: is_complete.then(now_rfc3339),
        };
        self.storage
            .upsert_document_status(snapshot, record.clone())
            .await?;
        Ok(record)
    }
}
