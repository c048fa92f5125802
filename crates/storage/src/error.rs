/// All errors that can be returned by a WorkflowStorage implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: another transaction changed
    /// the document's workflow state after this snapshot read it.
    #[error("concurrent conflict on document {document_id}: expected version {expected_version}")]
    ConcurrentConflict {
        document_id: String,
        expected_version: i64,
    },

    /// No document registered under this id.
    #[error("document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    /// A document with this id is already registered.
    #[error("document already registered: {document_id}")]
    DocumentExists { document_id: String },

    /// A history entry with this id was already written.
    #[error("duplicate history entry: {entry_id}")]
    DuplicateHistoryEntry { entry_id: String },

    /// A backend-specific storage error (connection, lock poisoning, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
