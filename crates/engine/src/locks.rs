//! Per-document mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entries nobody holds are dropped once the table grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Lazily created async mutexes keyed by document id.
#[derive(Debug, Default)]
pub(crate) struct DocumentLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `document_id`. Released on drop.
    pub(crate) async fn acquire(&self, document_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock().await;
            if table.len() > PRUNE_THRESHOLD {
                // A count of one means only the table references the lock.
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            table
                .entry(document_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.table.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_document_is_serialized() {
        let locks = Arc::new(DocumentLocks::new());
        let guard = locks.acquire("doc-1").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire("doc-1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn different_documents_do_not_contend() {
        let locks = DocumentLocks::new();
        let _a = locks.acquire("doc-1").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("doc-2")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = DocumentLocks::new();
        for i in 0..=PRUNE_THRESHOLD {
            drop(locks.acquire(&format!("doc-{i}")).await);
        }
        let _held = locks.acquire("doc-0").await;
        let _next = locks.acquire("fresh").await;
        assert!(locks.len().await <= 2);
    }
}
