//! Write-Ahead Logging (WAL) and snapshots for the bucket store

use crate::core::{StoreError, StoreResult};
use crate::storage::memory::MemoryBuckets;
use crate::transaction::Change;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

// ============================================================================
// WAL Records
// ============================================================================

/// One committed write transaction.
///
/// A transaction is logged as a single record, so replay applies it
/// entirely or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    pub txn_id: u64,
    pub changes: Vec<Change>,
}

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub buckets: MemoryBuckets,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: DateTime<Utc>,
    /// Last transaction folded into this snapshot
    pub last_txn_id: u64,
    pub key_count: usize,
    pub bucket_count: usize,
}

impl StoreSnapshot {
    pub fn new(buckets: MemoryBuckets, last_txn_id: u64) -> Self {
        let metadata = SnapshotMetadata {
            created_at: Utc::now(),
            last_txn_id,
            key_count: buckets.key_count(),
            bucket_count: buckets.bucket_count(),
        };
        Self {
            version: 1,
            buckets,
            metadata,
        }
    }
}

/// State rebuilt from disk at open time.
#[derive(Debug, Default)]
pub struct RecoveredState {
    pub buckets: MemoryBuckets,
    pub last_txn_id: u64,
    pub replayed: usize,
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityMode {
    /// fsync after every commit
    Sync,
    /// flush to the OS after every commit
    #[default]
    Async,
    /// memory only, nothing written to disk
    None,
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: BufWriter<File>,
    durability_mode: DurabilityMode,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
    /// A failed append could not be cut back off the file
    unusable: bool,
    #[cfg(test)]
    injected_failure: Option<usize>,
}

impl WalManager {
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> StoreResult<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io("create WAL directory", e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)
            .map_err(|e| StoreError::io("open WAL file", e))?;

        Ok(Self {
            wal_path,
            wal_file: BufWriter::new(file),
            durability_mode,
            entries_since_checkpoint: 0,
            checkpoint_threshold: 1000,
            unusable: false,
            #[cfg(test)]
            injected_failure: None,
        })
    }

    /// Append one record.
    ///
    /// On failure the file is cut back to its length before the call, so
    /// a later append never lands behind a partial record.
    pub fn append(&mut self, record: &WalRecord) -> StoreResult<()> {
        if self.unusable {
            return Err(StoreError::WalUnusable);
        }
        let serialized = rmp_serde::to_vec_named(record)?;
        let mut frame = Vec::with_capacity(4 + serialized.len());
        frame.extend_from_slice(&(serialized.len() as u32).to_le_bytes());
        frame.extend_from_slice(&serialized);

        let start = self
            .wal_file
            .get_ref()
            .metadata()
            .map_err(|e| StoreError::io("stat WAL", e))?
            .len();
        if let Err(err) = self.write_frame(&frame) {
            self.rollback_to(start);
            return Err(err);
        }
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> StoreResult<()> {
        #[cfg(test)]
        if let Some(keep) = self.injected_failure.take() {
            self.wal_file
                .write_all(&frame[..keep.min(frame.len())])
                .and_then(|_| self.wal_file.flush())
                .map_err(|e| StoreError::io("write WAL", e))?;
            return Err(StoreError::io(
                "write WAL",
                std::io::Error::other("simulated short write"),
            ));
        }

        self.wal_file
            .write_all(frame)
            .and_then(|_| self.wal_file.flush())
            .map_err(|e| StoreError::io("write WAL", e))?;
        if self.durability_mode == DurabilityMode::Sync {
            self.wal_file
                .get_ref()
                .sync_all()
                .map_err(|e| StoreError::io("sync WAL", e))?;
        }
        Ok(())
    }

    fn rollback_to(&mut self, len: u64) {
        let result = self
            .discard_buffer()
            .and_then(|_| self.wal_file.get_ref().set_len(len));
        match result {
            Ok(()) => warn!(path = %self.wal_path.display(), len, "rolled back failed WAL append"),
            Err(err) => {
                self.unusable = true;
                error!(
                    path = %self.wal_path.display(),
                    error = %err,
                    "cannot roll back failed WAL append, refusing further commits"
                );
            }
        }
    }

    // Replace the writer without flushing what it still buffers.
    fn discard_buffer(&mut self) -> std::io::Result<()> {
        let file = self.wal_file.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.wal_file, BufWriter::new(file));
        let _ = stale.into_parts();
        Ok(())
    }

    /// Make the next append write only `keep` bytes and then fail
    #[cfg(test)]
    pub(crate) fn fail_next_append_after(&mut self, keep: usize) {
        self.injected_failure = Some(keep);
    }

    pub fn read_all(&self) -> StoreResult<Vec<WalRecord>> {
        read_wal(&self.wal_path, true)
    }

    /// Empty the log; the state it held must already be in a snapshot
    pub fn clear(&mut self) -> StoreResult<()> {
        self.discard_buffer()
            .and_then(|_| self.wal_file.get_ref().set_len(0))
            .map_err(|e| StoreError::io("truncate WAL", e))?;
        self.entries_since_checkpoint = 0;
        self.unusable = false;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold;
    }
}

/// Read every complete record of a WAL file.
///
/// A record cut short by a crash mid-append ends the log. With `repair`
/// the torn bytes are truncated away so later appends start clean.
fn read_wal(path: &Path, repair: bool) -> StoreResult<Vec<WalRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).map_err(|e| StoreError::io("open WAL for reading", e))?;
    let file_len = file
        .metadata()
        .map_err(|e| StoreError::io("stat WAL", e))?
        .len();
    let mut reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut valid_len: u64 = 0;
    let mut torn = false;

    loop {
        let mut len_bytes = [0u8; 4];
        match read_full(&mut reader, &mut len_bytes) {
            Ok(0) => break,
            Ok(n) if n < len_bytes.len() => {
                torn = true;
                break;
            }
            Ok(_) => {}
            Err(e) => return Err(StoreError::io("read WAL record length", e)),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        // a length past the end of the file is a torn or corrupt header
        if len as u64 > file_len.saturating_sub(valid_len + 4) {
            torn = true;
            break;
        }
        let mut data = vec![0u8; len];
        match reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                torn = true;
                break;
            }
            Err(e) => return Err(StoreError::io("read WAL record", e)),
        }
        records.push(rmp_serde::from_slice(&data)?);
        valid_len += 4 + len as u64;
    }

    if torn {
        warn!(path = %path.display(), valid_len, "ignoring torn record at WAL tail");
        if repair {
            OpenOptions::new()
                .write(true)
                .open(path)
                .and_then(|f| f.set_len(valid_len))
                .map_err(|e| StoreError::io("truncate torn WAL tail", e))?;
        }
    }
    Ok(records)
}

// Like read_exact, but reports how much was read before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn save(&self, snapshot: &StoreSnapshot) -> StoreResult<()> {
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io("create snapshot directory", e))?;
        }
        let temp_path = self.snapshot_path.with_extension("tmp");
        let serialized = rmp_serde::to_vec_named(snapshot)?;
        let temp_file =
            File::create(&temp_path).map_err(|e| StoreError::io("create temp snapshot", e))?;
        let mut writer = BufWriter::new(temp_file);
        writer
            .write_all(&serialized)
            .and_then(|_| writer.flush())
            .and_then(|_| writer.get_mut().sync_all())
            .map_err(|e| StoreError::io("write snapshot", e))?;
        fs::rename(&temp_path, &self.snapshot_path)
            .map_err(|e| StoreError::io("rename snapshot", e))?;
        Ok(())
    }

    pub fn load(&self) -> StoreResult<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file =
            File::open(&self.snapshot_path).map_err(|e| StoreError::io("open snapshot", e))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| StoreError::io("read snapshot", e))?;
        Ok(Some(rmp_serde::from_slice(&data)?))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// Persistence Manager
// ============================================================================

pub struct PersistenceManager {
    wal: WalManager,
    snapshot: SnapshotManager,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(
        data_dir: P,
        file_stem: &str,
        durability_mode: DurabilityMode,
    ) -> StoreResult<Self> {
        let (wal_path, snapshot_path) = file_paths(data_dir.as_ref(), file_stem);
        let wal = WalManager::new(wal_path, durability_mode)?;
        let snapshot = SnapshotManager::new(snapshot_path);
        Ok(Self { wal, snapshot })
    }

    pub fn log(&mut self, record: &WalRecord) -> StoreResult<()> {
        self.wal.append(record)
    }

    /// Fold the current state into a fresh snapshot and empty the WAL
    pub fn checkpoint(&mut self, buckets: &MemoryBuckets, last_txn_id: u64) -> StoreResult<()> {
        let snapshot = StoreSnapshot::new(buckets.clone(), last_txn_id);
        self.snapshot.save(&snapshot)?;
        self.wal.clear()?;
        debug!(last_txn_id, keys = snapshot.metadata.key_count, "checkpoint written");
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    pub fn recover(&self) -> StoreResult<RecoveredState> {
        recover_from(self.snapshot.load()?, self.wal.read_all()?)
    }

    pub fn wal(&self) -> &WalManager {
        &self.wal
    }

    pub fn wal_mut(&mut self) -> &mut WalManager {
        &mut self.wal
    }

    pub fn snapshot(&self) -> &SnapshotManager {
        &self.snapshot
    }
}

/// Rebuild state from disk without opening anything for writing.
pub fn recover_read_only(data_dir: &Path, file_stem: &str) -> StoreResult<RecoveredState> {
    let (wal_path, snapshot_path) = file_paths(data_dir, file_stem);
    let snapshot = SnapshotManager::new(snapshot_path).load()?;
    recover_from(snapshot, read_wal(&wal_path, false)?)
}

fn recover_from(
    snapshot: Option<StoreSnapshot>,
    records: Vec<WalRecord>,
) -> StoreResult<RecoveredState> {
    let mut state = match snapshot {
        Some(snapshot) => RecoveredState {
            last_txn_id: snapshot.metadata.last_txn_id,
            buckets: snapshot.buckets,
            replayed: 0,
        },
        None => RecoveredState::default(),
    };

    for record in records {
        // already folded into the snapshot by an interrupted checkpoint
        if record.txn_id <= state.last_txn_id {
            continue;
        }
        for change in &record.changes {
            state.buckets.apply(change)?;
        }
        state.last_txn_id = record.txn_id;
        state.replayed += 1;
    }
    Ok(state)
}

fn file_paths(data_dir: &Path, file_stem: &str) -> (PathBuf, PathBuf) {
    (
        data_dir.join(format!("{file_stem}.wal")),
        data_dir.join(format!("{file_stem}.snapshot")),
    )
}
