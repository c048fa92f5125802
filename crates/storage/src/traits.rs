use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    DocumentRecord, DocumentStatusRecord, HistoryRecord, WorkflowStateRecord, WorkflowStateUpdate,
};

/// The storage trait for circuit workflow backends.
///
/// A `WorkflowStorage` implementation provides transactional storage for
/// documents, their workflow state, per-status completion rows and the
/// append-only history log.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, its writes MUST be
/// discarded. Reads made through a snapshot see that snapshot's own writes.
///
/// ## OCC Conflict Detection
///
/// `update_workflow_state` is conditional on `version = expected_version`.
/// A backend may report the conflict either from the update itself or from
/// `commit_snapshot`; in both cases the error is
/// `StorageError::ConcurrentConflict` and nothing from the snapshot persists.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared by the engine
/// and across async task boundaries.
#[async_trait]
pub trait WorkflowStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Document operations (within snapshot) ────────────────────────────────

    /// Register a document together with its initial `Draft` workflow state
    /// at version 0.
    ///
    /// Returns `Err(StorageError::DocumentExists)` if the id is taken.
    async fn insert_document(
        &self,
        snapshot: &mut Self::Snapshot,
        document: DocumentRecord,
    ) -> Result<(), StorageError>;

    /// Read a document's workflow state for modification.
    ///
    /// Returns `Err(StorageError::DocumentNotFound)` if the document does not exist.
    async fn get_workflow_state_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        document_id: &str,
    ) -> Result<WorkflowStateRecord, StorageError>;

    /// Apply a version-validated update to a document's workflow state.
    ///
    /// Returns the new version number on success.
    async fn update_workflow_state(
        &self,
        snapshot: &mut Self::Snapshot,
        document_id: &str,
        expected_version: i64,
        update: WorkflowStateUpdate,
    ) -> Result<i64, StorageError>;

    /// Read every status row of a document, including rows written earlier
    /// in this snapshot.
    async fn get_document_statuses_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        document_id: &str,
    ) -> Result<Vec<DocumentStatusRecord>, StorageError>;

    /// Insert or replace the row keyed by `(document_id, status_id)`.
    async fn upsert_document_status(
        &self,
        snapshot: &mut Self::Snapshot,
        record: DocumentStatusRecord,
    ) -> Result<(), StorageError>;

    /// Append a history entry.
    ///
    /// Returns `Err(StorageError::DuplicateHistoryEntry)` if the id was already used.
    async fn insert_history(
        &self,
        snapshot: &mut Self::Snapshot,
        record: HistoryRecord,
    ) -> Result<(), StorageError>;

    // ── Query operations (committed data, no snapshot) ────────────────────────

    /// Read a registered document.
    async fn get_document(&self, document_id: &str) -> Result<DocumentRecord, StorageError>;

    /// Read a document's committed workflow state.
    async fn get_workflow_state(
        &self,
        document_id: &str,
    ) -> Result<WorkflowStateRecord, StorageError>;

    /// List a document's committed status rows, ordered by status id.
    async fn list_document_statuses(
        &self,
        document_id: &str,
    ) -> Result<Vec<DocumentStatusRecord>, StorageError>;

    /// List a document's committed history in insertion order.
    async fn list_history(&self, document_id: &str) -> Result<Vec<HistoryRecord>, StorageError>;
}
