// ============================================================================
// Transaction Handles
// ============================================================================
//
// Readers and writers both work on their own copy of the committed bucket
// map (a persistent map, so the copy is O(1)):
// - ReadTxn sees the state as of begin_read and nothing after it
// - WriteTxn holds the single writer slot until it commits or is dropped
//
// ============================================================================

use super::Change;
use super::manager::{StoreInner, WriterState};
use crate::core::StoreResult;
use crate::storage::{KvRead, KvWrite, MemoryBuckets};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Identifier of a write transaction, increasing across restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// A read-only view of the store
pub struct ReadTxn {
    buckets: MemoryBuckets,
    version: u64,
}

impl ReadTxn {
    pub(crate) fn new(buckets: MemoryBuckets, version: u64) -> Self {
        Self { buckets, version }
    }

    /// Id of the last transaction visible to this reader
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl KvRead for ReadTxn {
    fn get(&self, bucket: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.buckets.get(bucket, key)?.cloned())
    }

    fn keys(&self, bucket: &str) -> StoreResult<Vec<String>> {
        self.buckets.keys(bucket)
    }

    fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.has_bucket(bucket)
    }
}

/// A read-write transaction
///
/// Mutations are staged on a private copy; `commit` publishes them,
/// dropping the transaction discards them.
pub struct WriteTxn {
    pub(super) id: TransactionId,
    pub(super) buckets: MemoryBuckets,
    pub(super) changes: Vec<Change>,
    pub(super) writer: OwnedMutexGuard<WriterState>,
    pub(super) store: Arc<StoreInner>,
    pub(super) started: Instant,
}

impl WriteTxn {
    /// Get the transaction ID
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Get all changes recorded in this transaction
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Log and publish every staged change
    pub async fn commit(self) -> StoreResult<()> {
        let store = Arc::clone(&self.store);
        store.commit(self).await
    }

    /// Discard every staged change and release the writer slot
    pub fn rollback(self) {
        debug!(txn = %self.id, changes = self.changes.len(), "rolled back");
    }
}

impl KvRead for WriteTxn {
    fn get(&self, bucket: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.buckets.get(bucket, key)?.cloned())
    }

    fn keys(&self, bucket: &str) -> StoreResult<Vec<String>> {
        self.buckets.keys(bucket)
    }

    fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.has_bucket(bucket)
    }
}

impl KvWrite for WriteTxn {
    fn put(&mut self, bucket: &str, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.buckets.put(bucket, key, value.clone())?;
        self.changes.push(Change::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn delete(&mut self, bucket: &str, key: &str) -> StoreResult<bool> {
        let existed = self.buckets.delete(bucket, key)?;
        if existed {
            self.changes.push(Change::Delete {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(existed)
    }

    fn create_bucket_if_missing(&mut self, bucket: &str) -> StoreResult<bool> {
        let created = self.buckets.create_bucket(bucket);
        if created {
            self.changes.push(Change::CreateBucket {
                bucket: bucket.to_string(),
            });
        }
        Ok(created)
    }
}
