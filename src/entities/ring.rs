use crate::core::{EntryKind, Result, RingError, SortedIds, generate_id};
use crate::entry::{Entry, ParentEntry};
use crate::registry::RegistryKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingAddRequest {
    #[serde(rename = "cluster")]
    pub cluster_id: String,
    pub name: String,
}

impl RingAddRequest {
    pub fn new(cluster_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster_id.is_empty() {
            return Err(RingError::InvalidRequest("Cluster id missing".into()));
        }
        if self.name.is_empty() {
            return Err(RingError::InvalidRequest("Ring name missing".into()));
        }
        // the name becomes a builder file name under the cluster directory
        if self.name.contains(['/', '\\']) || self.name.contains("..") {
            return Err(RingError::InvalidRequest(format!(
                "Ring name {:?} must not contain path separators or '..'",
                self.name
            )));
        }
        Ok(())
    }
}

/// A named ring (e.g. `account`, `container`, `object`) of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingEntry {
    id: String,
    cluster_id: String,
    name: String,
    #[serde(default)]
    nodes: SortedIds,
}

impl RingEntry {
    pub fn from_request(req: &RingAddRequest) -> Result<Self> {
        req.validate()?;
        Ok(Self {
            id: generate_id(),
            cluster_id: req.cluster_id.clone(),
            name: req.name.clone(),
            nodes: SortedIds::new(),
        })
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &SortedIds {
        &self.nodes
    }

    pub fn info(&self) -> RingInfo {
        RingInfo {
            id: self.id.clone(),
            cluster_id: self.cluster_id.clone(),
            name: self.name.clone(),
            nodes: self.nodes.to_vec(),
        }
    }
}

impl Entry for RingEntry {
    const KIND: EntryKind = EntryKind::Ring;

    fn id(&self) -> &str {
        &self.id
    }

    fn registry_key(&self) -> Option<RegistryKey> {
        Some(RegistryKey::ring(&self.cluster_id, &self.name))
    }

    fn child_ids(&self) -> Option<&SortedIds> {
        Some(&self.nodes)
    }
}

impl ParentEntry for RingEntry {
    fn child_ids_mut(&mut self) -> &mut SortedIds {
        &mut self.nodes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingInfo {
    pub id: String,
    #[serde(rename = "cluster")]
    pub cluster_id: String,
    pub name: String,
    pub nodes: Vec<String>,
}
