pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{InMemoryStorage, MemorySnapshot};
pub use record::{
    DocumentRecord, DocumentStatusRecord, HistoryKind, HistoryRecord, WorkflowStateRecord,
    WorkflowStateUpdate, WorkflowStatus,
};
pub use traits::WorkflowStorage;
