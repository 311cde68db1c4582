use crate::core::{EntryKind, SortedIds, generate_id};
use crate::entry::{Entry, ParentEntry};
use serde::{Deserialize, Serialize};

/// Top of the hierarchy; links to its rings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEntry {
    id: String,
    #[serde(default)]
    rings: SortedIds,
}

impl ClusterEntry {
    /// A new, unpersisted cluster with a fresh id and no rings
    pub fn new() -> Self {
        Self {
            id: generate_id(),
            rings: SortedIds::new(),
        }
    }

    pub fn rings(&self) -> &SortedIds {
        &self.rings
    }

    pub fn info(&self) -> ClusterInfo {
        ClusterInfo {
            id: self.id.clone(),
            rings: self.rings.to_vec(),
        }
    }
}

impl Default for ClusterEntry {
    fn default() -> Self {
        Self::new()
    }
}

impl Entry for ClusterEntry {
    const KIND: EntryKind = EntryKind::Cluster;

    fn id(&self) -> &str {
        &self.id
    }

    fn child_ids(&self) -> Option<&SortedIds> {
        Some(&self.rings)
    }
}

impl ParentEntry for ClusterEntry {
    fn child_ids_mut(&mut self) -> &mut SortedIds {
        &mut self.rings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub id: String,
    pub rings: Vec<String>,
}
