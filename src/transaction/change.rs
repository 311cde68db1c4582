// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// A write transaction records every mutation it makes as a Change. The
// list is logged as one WAL record at commit and replayed on recovery;
// on rollback it is simply dropped.
//
// ============================================================================

use serde::{Deserialize, Serialize};

/// A single mutation staged by a write transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// Create an empty bucket
    CreateBucket { bucket: String },

    /// Store a value under a key
    Put {
        bucket: String,
        key: String,
        value: Vec<u8>,
    },

    /// Remove a key
    Delete { bucket: String, key: String },
}

impl Change {
    /// Get the bucket affected by this change
    pub fn bucket(&self) -> &str {
        match self {
            Change::CreateBucket { bucket } => bucket,
            Change::Put { bucket, .. } => bucket,
            Change::Delete { bucket, .. } => bucket,
        }
    }

    /// Check if this change alters the set of buckets
    pub fn is_ddl(&self) -> bool {
        matches!(self, Change::CreateBucket { .. })
    }
}
