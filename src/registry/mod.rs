//! Uniqueness records over composite business keys.
//!
//! A registry record maps an encoded business key (e.g. "device `sdb1` on
//! node N") to the id of the entity holding it. The store has no unique
//! constraints of its own, so every create goes through [`register`]
//! inside the same write transaction that persists the entity.
//!
//! A record whose id has no entity behind it is stale: it was written by
//! a transaction that registered the key and then failed to persist the
//! entity. Stale records are reclaimed by the next registration of the
//! same key.

use crate::core::{EntryKind, StoreError, StoreResult};
use crate::storage::{KvRead, KvWrite};
use std::fmt::{self, Write};
use tracing::{debug, warn};

/// Structured composite key: a kind tag plus the scoping fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    kind: EntryKind,
    fields: Vec<String>,
    description: String,
}

impl RegistryKey {
    /// A ring name is unique within its cluster.
    pub fn ring(cluster_id: &str, name: &str) -> Self {
        Self {
            kind: EntryKind::Ring,
            fields: vec![cluster_id.to_string(), name.to_string()],
            description: format!("'{name}' in cluster {cluster_id}"),
        }
    }

    /// A node is unique within its ring by node id.
    pub fn node(ring_id: &str, node_id: &str) -> Self {
        Self {
            kind: EntryKind::Node,
            fields: vec![ring_id.to_string(), node_id.to_string()],
            description: format!("{node_id} in ring {ring_id}"),
        }
    }

    /// A device name is unique within its node.
    pub fn device(node_id: &str, name: &str) -> Self {
        Self {
            kind: EntryKind::Device,
            fields: vec![node_id.to_string(), name.to_string()],
            description: format!("'{name}' on node {node_id}"),
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Human-readable form for conflict messages
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Storage form: the kind tag, then `/<len>:<field>` per field.
    ///
    /// Length prefixes keep `("ab", "c")` and `("a", "bc")` apart.
    pub fn encode(&self) -> String {
        let mut encoded = self.kind.bucket().to_string();
        for field in &self.fields {
            let _ = write!(encoded, "/{}:{}", field.len(), field);
        }
        encoded
    }

    fn bucket(&self) -> StoreResult<&'static str> {
        self.kind
            .registry_bucket()
            .ok_or_else(|| StoreError::BucketNotFound(format!("{}_REGISTRY", self.kind.bucket())))
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Result of a registration attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The key was free (or already held by the candidate)
    Registered,
    /// The key pointed at an entity that no longer exists and now points at the candidate
    Reclaimed { stale_id: String },
    /// The key is held by a live entity
    Conflict { existing_id: String },
}

impl RegisterOutcome {
    pub fn is_registered(&self) -> bool {
        !matches!(self, RegisterOutcome::Conflict { .. })
    }
}

/// Bind `key` to `candidate_id` unless a live entity already holds it.
///
/// Liveness is checked against the entity bucket of the key's kind.
pub fn register<T: KvWrite>(
    tx: &mut T,
    key: &RegistryKey,
    candidate_id: &str,
) -> StoreResult<RegisterOutcome> {
    let bucket = key.bucket()?;
    let encoded = key.encode();

    let existing_id = match tx.get(bucket, &encoded)? {
        None => {
            tx.put(bucket, &encoded, candidate_id.as_bytes().to_vec())?;
            debug!(kind = %key.kind(), key = %key, id = candidate_id, "registered");
            return Ok(RegisterOutcome::Registered);
        }
        Some(raw) => decode_id(raw)?,
    };

    if existing_id == candidate_id {
        return Ok(RegisterOutcome::Registered);
    }

    if tx.contains(key.kind().bucket(), &existing_id)? {
        return Ok(RegisterOutcome::Conflict { existing_id });
    }

    warn!(
        kind = %key.kind(),
        key = %key,
        stale_id = %existing_id,
        id = candidate_id,
        "reclaiming stale registry record"
    );
    tx.put(bucket, &encoded, candidate_id.as_bytes().to_vec())?;
    Ok(RegisterOutcome::Reclaimed {
        stale_id: existing_id,
    })
}

/// Remove the record for `key`; a missing record is fine.
pub fn deregister<T: KvWrite>(tx: &mut T, key: &RegistryKey) -> StoreResult<()> {
    let bucket = key.bucket()?;
    if tx.delete(bucket, &key.encode())? {
        debug!(kind = %key.kind(), key = %key, "deregistered");
    }
    Ok(())
}

/// The id currently recorded for `key`, live or stale.
pub fn lookup<T: KvRead>(tx: &T, key: &RegistryKey) -> StoreResult<Option<String>> {
    let bucket = key.bucket()?;
    tx.get(bucket, &key.encode())?.map(decode_id).transpose()
}

fn decode_id(raw: Vec<u8>) -> StoreResult<String> {
    String::from_utf8(raw).map_err(|e| StoreError::Codec(format!("registry record is not UTF-8: {e}")))
}
