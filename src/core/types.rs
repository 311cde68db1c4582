use serde::{Deserialize, Serialize};
use std::fmt;

pub const BUCKET_CLUSTER: &str = "CLUSTER";
pub const BUCKET_RING: &str = "RING";
pub const BUCKET_NODE: &str = "NODE";
pub const BUCKET_DEVICE: &str = "DEVICE";

pub const BUCKET_RING_REGISTRY: &str = "RING_REGISTRY";
pub const BUCKET_NODE_REGISTRY: &str = "NODE_REGISTRY";
pub const BUCKET_DEVICE_REGISTRY: &str = "DEVICE_REGISTRY";

/// The four levels of the topology hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Cluster,
    Ring,
    Node,
    Device,
}

impl EntryKind {
    pub const ALL: [EntryKind; 4] = [
        EntryKind::Cluster,
        EntryKind::Ring,
        EntryKind::Node,
        EntryKind::Device,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Cluster => "cluster",
            EntryKind::Ring => "ring",
            EntryKind::Node => "node",
            EntryKind::Device => "device",
        }
    }

    /// Bucket holding the serialized entities of this kind.
    pub fn bucket(&self) -> &'static str {
        match self {
            EntryKind::Cluster => BUCKET_CLUSTER,
            EntryKind::Ring => BUCKET_RING,
            EntryKind::Node => BUCKET_NODE,
            EntryKind::Device => BUCKET_DEVICE,
        }
    }

    /// Bucket holding the uniqueness records of this kind.
    ///
    /// Clusters are globally scoped and have none.
    pub fn registry_bucket(&self) -> Option<&'static str> {
        match self {
            EntryKind::Cluster => None,
            EntryKind::Ring => Some(BUCKET_RING_REGISTRY),
            EntryKind::Node => Some(BUCKET_NODE_REGISTRY),
            EntryKind::Device => Some(BUCKET_DEVICE_REGISTRY),
        }
    }

    pub fn child_kind(&self) -> Option<EntryKind> {
        match self {
            EntryKind::Cluster => Some(EntryKind::Ring),
            EntryKind::Ring => Some(EntryKind::Node),
            EntryKind::Node => Some(EntryKind::Device),
            EntryKind::Device => None,
        }
    }

    pub fn parent_kind(&self) -> Option<EntryKind> {
        match self {
            EntryKind::Cluster => None,
            EntryKind::Ring => Some(EntryKind::Cluster),
            EntryKind::Node => Some(EntryKind::Ring),
            EntryKind::Device => Some(EntryKind::Node),
        }
    }

    /// Every bucket the topology needs, entity buckets first.
    pub fn all_buckets() -> Vec<&'static str> {
        let mut buckets: Vec<&'static str> = Self::ALL.iter().map(|k| k.bucket()).collect();
        buckets.extend(Self::ALL.iter().filter_map(|k| k.registry_bucket()));
        buckets
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
