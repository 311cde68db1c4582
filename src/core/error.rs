use super::EntryKind;
use std::fmt;
use thiserror::Error;

/// Failures of the bucket store itself.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Bucket '{0}' not found")]
    BucketNotFound(String),

    #[error("Store is opened read-only")]
    ReadOnly,

    #[error("Store is closed")]
    Closed,

    #[error("Invalid store configuration: {0}")]
    Config(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Inconsistent store: {0}")]
    Inconsistent(String),

    #[error("WAL is unusable after a failed append could not be rolled back; reopen the store")]
    WalUnusable,
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Detail carried by a refused operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The business key is bound to a live entity.
    KeyInUse {
        kind: EntryKind,
        key: String,
        existing_id: String,
    },
    /// The entity still has children linked to it.
    HasChildren {
        kind: EntryKind,
        id: String,
        child_kind: EntryKind,
        count: usize,
    },
}

impl Conflict {
    /// Id of the entity that caused the refusal.
    pub fn conflicting_id(&self) -> &str {
        match self {
            Conflict::KeyInUse { existing_id, .. } => existing_id,
            Conflict::HasChildren { id, .. } => id,
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::KeyInUse {
                kind,
                key,
                existing_id,
            } => write!(f, "{kind} {key} is already used by {kind} {existing_id}"),
            Conflict::HasChildren {
                kind,
                id,
                child_kind,
                count,
            } => write!(
                f,
                "Unable to delete {kind} [{id}] because it contains {count} {child_kind}(s)"
            ),
        }
    }
}

#[derive(Error, Debug)]
pub enum RingError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntryKind, id: String },

    #[error("{0}")]
    Conflict(Conflict),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl RingError {
    pub fn not_found(kind: EntryKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RingError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RingError::Conflict(_))
    }

    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            RingError::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RingError>;
