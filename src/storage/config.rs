use super::persistence::DurabilityMode;
use std::path::PathBuf;

/// Bucket store configuration
///
/// Without a data directory the store lives in memory only.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the WAL and snapshot files
    pub data_dir: Option<PathBuf>,

    /// File name stem: `<stem>.wal` and `<stem>.snapshot`
    pub file_stem: String,

    /// When commits reach the disk
    pub durability: DurabilityMode,

    /// WAL records between automatic checkpoints
    pub checkpoint_threshold: usize,

    /// Refuse write transactions
    pub read_only: bool,
}

impl StoreConfig {
    /// A store that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            file_stem: "swift_clusters".to_string(),
            durability: DurabilityMode::None,
            checkpoint_threshold: 1000,
            read_only: false,
        }
    }

    /// A store persisted under `data_dir`
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            durability: DurabilityMode::Async,
            ..Self::in_memory()
        }
    }

    /// Set the file name stem
    pub fn file_stem(mut self, stem: &str) -> Self {
        self.file_stem = stem.to_string();
        self
    }

    /// Set the durability mode
    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// Set the checkpoint threshold
    pub fn checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold;
        self
    }

    /// Open read-only
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Whether commits are written to disk
    pub fn is_persistent(&self) -> bool {
        self.data_dir.is_some() && self.durability != DurabilityMode::None
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.file_stem.is_empty() {
            return Err("file_stem cannot be empty".to_string());
        }

        if self.file_stem.contains(['/', '\\']) {
            return Err("file_stem cannot contain path separators".to_string());
        }

        if self.checkpoint_threshold == 0 {
            return Err("checkpoint_threshold must be > 0".to_string());
        }

        if self.read_only && self.data_dir.is_none() {
            return Err("a read-only store needs a data directory".to_string());
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
