// ============================================================================
// Transaction Manager
// ============================================================================
//
// `Store` is the handle to one open bucket store. It hands out read
// transactions over the last committed state and serializes writers
// through a single slot. Commit order:
//   1. append the change list to the WAL (when persistent)
//   2. publish the new bucket map to readers
//   3. checkpoint if the WAL grew past its threshold
//
// ============================================================================

use super::{ReadTxn, TransactionId, WriteTxn};
use crate::core::{StoreError, StoreResult};
use crate::storage::MemoryBuckets;
use crate::storage::config::StoreConfig;
use crate::storage::persistence::{
    PersistenceManager, RecoveredState, WalRecord, recover_read_only,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub(crate) struct Committed {
    buckets: MemoryBuckets,
    version: u64,
}

pub(crate) struct WriterState {
    persistence: Option<PersistenceManager>,
    last_txn_id: u64,
}

pub(crate) struct StoreInner {
    config: StoreConfig,
    committed: RwLock<Committed>,
    writer: Arc<Mutex<WriterState>>,
    closed: AtomicBool,
}

/// Handle to an open bucket store
///
/// Cloning is cheap; every clone refers to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Open (or create) a store, replaying the snapshot and WAL
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate().map_err(StoreError::Config)?;

        let (recovered, persistence) = match &config.data_dir {
            Some(dir) if config.read_only => (recover_read_only(dir, &config.file_stem)?, None),
            Some(dir) if config.is_persistent() => {
                let mut persistence =
                    PersistenceManager::new(dir, &config.file_stem, config.durability)?;
                persistence
                    .wal_mut()
                    .set_checkpoint_threshold(config.checkpoint_threshold);
                (persistence.recover()?, Some(persistence))
            }
            _ => (RecoveredState::default(), None),
        };

        info!(
            data_dir = ?config.data_dir,
            read_only = config.read_only,
            buckets = recovered.buckets.bucket_count(),
            keys = recovered.buckets.key_count(),
            replayed = recovered.replayed,
            "store opened"
        );

        let inner = StoreInner {
            committed: RwLock::new(Committed {
                buckets: recovered.buckets,
                version: recovered.last_txn_id,
            }),
            writer: Arc::new(Mutex::new(WriterState {
                persistence,
                last_txn_id: recovered.last_txn_id,
            })),
            closed: AtomicBool::new(false),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// In-memory store, mostly useful for tests
    pub async fn memory() -> StoreResult<Self> {
        Self::open(StoreConfig::in_memory()).await
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Id of the last committed transaction
    pub async fn version(&self) -> u64 {
        self.inner.committed.read().await.version
    }

    /// Begin a read transaction over the last committed state
    pub async fn begin_read(&self) -> StoreResult<ReadTxn> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let committed = self.inner.committed.read().await.clone();
        Ok(ReadTxn::new(committed.buckets, committed.version))
    }

    /// Begin a write transaction, waiting for the writer slot
    pub async fn begin_write(&self) -> StoreResult<WriteTxn> {
        if self.inner.config.read_only {
            return Err(StoreError::ReadOnly);
        }
        let writer = Arc::clone(&self.inner.writer).lock_owned().await;
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let buckets = self.inner.committed.read().await.buckets.clone();
        let id = TransactionId(writer.last_txn_id + 1);
        Ok(WriteTxn {
            id,
            buckets,
            changes: Vec::new(),
            writer,
            store: Arc::clone(&self.inner),
            started: Instant::now(),
        })
    }

    /// Run `f` in a write transaction, committing only if it returns `Ok`
    pub async fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteTxn) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut txn = self.begin_write().await?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(err) => {
                txn.rollback();
                Err(err)
            }
        }
    }

    /// Run `f` in a read transaction
    pub async fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTxn) -> Result<T, E>,
        E: From<StoreError>,
    {
        let txn = self.begin_read().await?;
        f(&txn)
    }

    /// Fold the WAL into a new snapshot now
    pub async fn checkpoint(&self) -> StoreResult<()> {
        let mut writer = self.inner.writer.lock().await;
        if let Some(persistence) = writer.persistence.as_mut() {
            let committed = self.inner.committed.read().await.clone();
            persistence.checkpoint(&committed.buckets, committed.version)?;
        }
        Ok(())
    }

    /// Checkpoint and refuse any further transaction
    pub async fn close(&self) -> StoreResult<()> {
        let mut writer = self.inner.writer.lock().await;
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(mut persistence) = writer.persistence.take() {
            let committed = self.inner.committed.read().await.clone();
            persistence.checkpoint(&committed.buckets, committed.version)?;
        }
        info!(version = writer.last_txn_id, "store closed");
        Ok(())
    }
}

impl StoreInner {
    pub(super) async fn commit(&self, txn: WriteTxn) -> StoreResult<()> {
        let WriteTxn {
            id,
            buckets,
            changes,
            mut writer,
            started,
            ..
        } = txn;

        if changes.is_empty() {
            debug!(txn = %id, "nothing to commit");
            return Ok(());
        }

        let record = WalRecord {
            txn_id: id.as_u64(),
            changes,
        };
        if let Some(persistence) = writer.persistence.as_mut() {
            persistence.log(&record)?;
        }
        writer.last_txn_id = id.as_u64();

        {
            let mut committed = self.committed.write().await;
            *committed = Committed {
                buckets: buckets.clone(),
                version: id.as_u64(),
            };
        }

        let mut touched: Vec<&str> = record.changes.iter().map(|c| c.bucket()).collect();
        touched.sort_unstable();
        touched.dedup();
        debug!(
            txn = %id,
            changes = record.changes.len(),
            buckets = ?touched,
            created_buckets = record.changes.iter().filter(|c| c.is_ddl()).count(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "committed"
        );

        if let Some(persistence) = writer.persistence.as_mut() {
            if persistence.needs_checkpoint() {
                // the commit is already durable in the WAL
                if let Err(err) = persistence.checkpoint(&buckets, id.as_u64()) {
                    warn!(txn = %id, error = %err, "checkpoint failed");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DurabilityMode, KvRead, KvWrite};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let store = Store::memory().await.unwrap();

        let mut txn = store.begin_write().await.unwrap();
        txn.create_bucket_if_missing("A").unwrap();
        txn.put("A", "k", b"v".to_vec()).unwrap();
        assert_eq!(txn.changes().len(), 2);
        txn.commit().await.unwrap();

        let read = store.begin_read().await.unwrap();
        assert_eq!(read.get("A", "k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(read.version(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_discarded() {
        let store = Store::memory().await.unwrap();
        {
            let mut txn = store.begin_write().await.unwrap();
            txn.create_bucket_if_missing("A").unwrap();
        }
        let read = store.begin_read().await.unwrap();
        assert!(!read.has_bucket("A"));
        assert_eq!(store.version().await, 0);
    }

    #[tokio::test]
    async fn test_update_rolls_back_on_error() {
        let store = Store::memory().await.unwrap();
        store
            .update(|txn| txn.create_bucket_if_missing("A").map(|_| ()))
            .await
            .unwrap();

        let result: StoreResult<()> = store
            .update(|txn| {
                txn.put("A", "k", vec![1])?;
                txn.put("MISSING", "k", vec![1])?;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::BucketNotFound(_))));

        let keys = store.view(|txn| txn.keys("A")).await.unwrap();
        assert!(keys.is_empty());
    }

    #[tokio::test]
    async fn test_reader_keeps_its_snapshot() {
        let store = Store::memory().await.unwrap();
        store
            .update(|txn| txn.create_bucket_if_missing("A"))
            .await
            .unwrap();

        let before = store.begin_read().await.unwrap();
        store
            .update(|txn| txn.put("A", "k", vec![7]))
            .await
            .unwrap();

        assert_eq!(before.get("A", "k").unwrap(), None);
        let after = store.begin_read().await.unwrap();
        assert_eq!(after.get("A", "k").unwrap(), Some(vec![7]));
    }

    #[tokio::test]
    async fn test_writers_are_serialized() {
        let store = Store::memory().await.unwrap();
        store
            .update(|txn| txn.create_bucket_if_missing("A"))
            .await
            .unwrap();

        let first = store.begin_write().await.unwrap();
        let contender = store.clone();
        let handle = tokio::spawn(async move {
            contender
                .update(|txn| txn.put("A", "second", vec![2]))
                .await
        });

        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        first.rollback();

        handle.await.unwrap().unwrap();
        assert!(store.view(|txn| txn.contains("A", "second")).await.unwrap());
    }

    #[tokio::test]
    async fn test_reopen_recovers_committed_state() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::persistent(temp_dir.path()).durability(DurabilityMode::Sync);

        let store = Store::open(config.clone()).await.unwrap();
        store
            .update(|txn| {
                txn.create_bucket_if_missing("A")?;
                txn.put("A", "k", b"v".to_vec())
            })
            .await
            .unwrap();
        // never closed: state must come back from the WAL alone
        drop(store);

        let reopened = Store::open(config.clone()).await.unwrap();
        assert_eq!(reopened.version().await, 1);
        assert_eq!(
            reopened.view(|txn| txn.get("A", "k")).await.unwrap(),
            Some(b"v".to_vec())
        );
        reopened.update(|txn| txn.delete("A", "k")).await.unwrap();
        reopened.close().await.unwrap();

        let again = Store::open(config).await.unwrap();
        assert_eq!(again.version().await, 2);
        assert!(!again.view(|txn| txn.contains("A", "k")).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_after_failed_wal_write_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::persistent(temp_dir.path()).durability(DurabilityMode::Sync);

        let store = Store::open(config.clone()).await.unwrap();
        store
            .update(|txn| {
                txn.create_bucket_if_missing("A")?;
                txn.put("A", "k1", vec![1])
            })
            .await
            .unwrap();

        {
            let mut writer = store.inner.writer.lock().await;
            let persistence = writer.persistence.as_mut().unwrap();
            persistence.wal_mut().fail_next_append_after(6);
        }
        let err = store
            .update(|txn| txn.put("A", "k2", vec![2]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(store.version().await, 1);
        assert!(!store.view(|txn| txn.contains("A", "k2")).await.unwrap());

        store.update(|txn| txn.put("A", "k3", vec![3])).await.unwrap();
        assert_eq!(store.version().await, 2);
        // no close: the WAL alone must carry k3
        drop(store);

        let reopened = Store::open(config).await.unwrap();
        assert_eq!(reopened.version().await, 2);
        assert_eq!(reopened.view(|txn| txn.get("A", "k3")).await.unwrap(), Some(vec![3]));
        assert!(!reopened.view(|txn| txn.contains("A", "k2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_explicit_checkpoint_empties_wal() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::persistent(temp_dir.path());
        let store = Store::open(config.clone()).await.unwrap();
        assert_eq!(store.config().data_dir.as_deref(), Some(temp_dir.path()));

        store
            .update(|txn| {
                txn.create_bucket_if_missing("A")?;
                txn.put("A", "k", vec![7])
            })
            .await
            .unwrap();
        let wal_path = temp_dir.path().join("swift_clusters.wal");
        assert!(std::fs::metadata(&wal_path).unwrap().len() > 0);

        store.checkpoint().await.unwrap();
        assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 0);
        assert!(temp_dir.path().join("swift_clusters.snapshot").exists());
        drop(store);

        let reopened = Store::open(config).await.unwrap();
        assert_eq!(reopened.version().await, 1);
        assert_eq!(reopened.view(|txn| txn.get("A", "k")).await.unwrap(), Some(vec![7]));

        // nothing to do for a store without files
        Store::memory().await.unwrap().checkpoint().await.unwrap();
    }

    #[tokio::test]
    async fn test_checkpoint_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::persistent(temp_dir.path()).checkpoint_threshold(2);
        let store = Store::open(config.clone()).await.unwrap();
        store
            .update(|txn| txn.create_bucket_if_missing("A"))
            .await
            .unwrap();
        store.update(|txn| txn.put("A", "k1", vec![1])).await.unwrap();
        store.update(|txn| txn.put("A", "k2", vec![2])).await.unwrap();
        drop(store);

        assert!(temp_dir.path().join("swift_clusters.snapshot").exists());
        let reopened = Store::open(config).await.unwrap();
        assert_eq!(reopened.version().await, 3);
        assert_eq!(reopened.view(|txn| txn.keys("A")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_store_refuses_transactions() {
        let store = Store::memory().await.unwrap();
        store.close().await.unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.begin_read().await, Err(StoreError::Closed)));
        assert!(matches!(store.begin_write().await, Err(StoreError::Closed)));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_only_store() {
        let temp_dir = TempDir::new().unwrap();
        let writable = Store::open(StoreConfig::persistent(temp_dir.path())).await.unwrap();
        writable
            .update(|txn| txn.create_bucket_if_missing("A"))
            .await
            .unwrap();
        writable.close().await.unwrap();

        let read_only = Store::open(StoreConfig::persistent(temp_dir.path()).read_only(true))
            .await
            .unwrap();
        assert!(read_only.view(|txn| Ok::<_, StoreError>(txn.has_bucket("A"))).await.unwrap());
        assert!(matches!(read_only.begin_write().await, Err(StoreError::ReadOnly)));
    }
}
