//! In-process `WorkflowStorage` backend.
//!
//! Committed data lives behind a single `RwLock`. A `MemorySnapshot` buffers
//! every write and remembers the workflow-state version it based each update
//! on; `commit_snapshot` re-validates those versions and applies the whole
//! buffer under one write lock, so a commit is all-or-nothing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    DocumentRecord, DocumentStatusRecord, HistoryRecord, WorkflowStateRecord, WorkflowStateUpdate,
};
use crate::traits::WorkflowStorage;

type StatusKey = (String, String);

#[derive(Debug, Default)]
struct Tables {
    documents: HashMap<String, DocumentRecord>,
    states: HashMap<String, WorkflowStateRecord>,
    statuses: BTreeMap<StatusKey, DocumentStatusRecord>,
    history: HashMap<String, Vec<HistoryRecord>>,
    history_ids: HashSet<String>,
}

/// Buffered writes of an in-progress `InMemoryStorage` transaction.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    documents: BTreeMap<String, DocumentRecord>,
    states: BTreeMap<String, WorkflowStateRecord>,
    /// Committed version each touched (pre-existing) state was read at.
    base_versions: BTreeMap<String, i64>,
    statuses: BTreeMap<StatusKey, DocumentStatusRecord>,
    history: Vec<HistoryRecord>,
}

impl MemorySnapshot {
    fn history_id_taken(&self, id: &str) -> bool {
        self.history.iter().any(|h| h.id == id)
    }
}

/// Thread-safe in-memory storage.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables
            .read()
            .map_err(|_| StorageError::Backend("in-memory tables lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables
            .write()
            .map_err(|_| StorageError::Backend("in-memory tables lock poisoned".to_string()))
    }

    fn document_known(
        &self,
        snapshot: &MemorySnapshot,
        document_id: &str,
    ) -> Result<(), StorageError> {
        if snapshot.documents.contains_key(document_id)
            || self.read()?.documents.contains_key(document_id)
        {
            Ok(())
        } else {
            Err(StorageError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
        }
    }
}

#[async_trait]
impl WorkflowStorage for InMemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut tables = self.write()?;

        // Validate everything before touching any table.
        for document_id in snapshot.documents.keys() {
            if tables.documents.contains_key(document_id) {
                return Err(StorageError::DocumentExists {
                    document_id: document_id.clone(),
                });
            }
        }
        for (document_id, base) in &snapshot.base_versions {
            let committed = tables.states.get(document_id).map(|s| s.version);
            if committed != Some(*base) {
                return Err(StorageError::ConcurrentConflict {
                    document_id: document_id.clone(),
                    expected_version: *base,
                });
            }
        }
        for entry in &snapshot.history {
            if tables.history_ids.contains(&entry.id) {
                return Err(StorageError::DuplicateHistoryEntry {
                    entry_id: entry.id.clone(),
                });
            }
        }

        let MemorySnapshot {
            documents,
            states,
            statuses,
            history,
            ..
        } = snapshot;
        tables.documents.extend(documents);
        tables.states.extend(states);
        tables.statuses.extend(statuses);
        for entry in history {
            tables.history_ids.insert(entry.id.clone());
            tables
                .history
                .entry(entry.document_id.clone())
                .or_default()
                .push(entry);
        }
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_document(
        &self,
        snapshot: &mut MemorySnapshot,
        document: DocumentRecord,
    ) -> Result<(), StorageError> {
        if snapshot.documents.contains_key(&document.id)
            || self.read()?.documents.contains_key(&document.id)
        {
            return Err(StorageError::DocumentExists {
                document_id: document.id,
            });
        }
        let state = WorkflowStateRecord::draft(&document.id, &document.created_at);
        snapshot.states.insert(document.id.clone(), state);
        snapshot.documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn get_workflow_state_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        document_id: &str,
    ) -> Result<WorkflowStateRecord, StorageError> {
        if let Some(state) = snapshot.states.get(document_id) {
            return Ok(state.clone());
        }
        self.read()?
            .states
            .get(document_id)
            .cloned()
            .ok_or_else(|| StorageError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    async fn update_workflow_state(
        &self,
        snapshot: &mut MemorySnapshot,
        document_id: &str,
        expected_version: i64,
        update: WorkflowStateUpdate,
    ) -> Result<i64, StorageError> {
        let current = self
            .get_workflow_state_for_update(snapshot, document_id)
            .await?;
        if current.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                document_id: document_id.to_string(),
                expected_version,
            });
        }
        if !snapshot.documents.contains_key(document_id) {
            snapshot
                .base_versions
                .entry(document_id.to_string())
                .or_insert(expected_version);
        }

        let completed = update.status == crate::record::WorkflowStatus::Completed;
        let next = WorkflowStateRecord {
            document_id: document_id.to_string(),
            circuit_id: update.circuit_id,
            current_step_id: update.current_step_id,
            status: update.status,
            is_circuit_completed: completed,
            version: current.version + 1,
            updated_at: update.updated_at,
        };
        let version = next.version;
        snapshot.states.insert(document_id.to_string(), next);
        Ok(version)
    }

    async fn get_document_statuses_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        document_id: &str,
    ) -> Result<Vec<DocumentStatusRecord>, StorageError> {
        self.document_known(snapshot, document_id)?;
        let mut merged: BTreeMap<StatusKey, DocumentStatusRecord> = self
            .read()?
            .statuses
            .iter()
            .filter(|((doc, _), _)| doc == document_id)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, record) in &snapshot.statuses {
            if key.0 == document_id {
                merged.insert(key.clone(), record.clone());
            }
        }
        Ok(merged.into_values().collect())
    }

    async fn upsert_document_status(
        &self,
        snapshot: &mut MemorySnapshot,
        record: DocumentStatusRecord,
    ) -> Result<(), StorageError> {
        self.document_known(snapshot, &record.document_id)?;
        let key = (record.document_id.clone(), record.status_id.clone());
        snapshot.statuses.insert(key, record);
        Ok(())
    }

    async fn insert_history(
        &self,
        snapshot: &mut MemorySnapshot,
        record: HistoryRecord,
    ) -> Result<(), StorageError> {
        self.document_known(snapshot, &record.document_id)?;
        if snapshot.history_id_taken(&record.id) || self.read()?.history_ids.contains(&record.id) {
            return Err(StorageError::DuplicateHistoryEntry {
                entry_id: record.id,
            });
        }
        snapshot.history.push(record);
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> Result<DocumentRecord, StorageError> {
        self.read()?
            .documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| StorageError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    async fn get_workflow_state(
        &self,
        document_id: &str,
    ) -> Result<WorkflowStateRecord, StorageError> {
        self.read()?
            .states
            .get(document_id)
            .cloned()
            .ok_or_else(|| StorageError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    async fn list_document_statuses(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentStatusRecord>, StorageError> {
        let tables = self.read()?;
        if !tables.documents.contains_key(document_id) {
            return Err(StorageError::DocumentNotFound {
                document_id: document_id.to_string(),
            });
        }
        Ok(tables
            .statuses
            .iter()
            .filter(|((doc, _), _)| doc == document_id)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn list_history(&self, document_id: &str) -> Result<Vec<HistoryRecord>, StorageError> {
        let tables = self.read()?;
        if !tables.documents.contains_key(document_id) {
            return Err(StorageError::DocumentNotFound {
                document_id: document_id.to_string(),
            });
        }
        Ok(tables.history.get(document_id).cloned().unwrap_or_default())
    }
}
