use crate::core::{EntryKind, Result, RingError, SortedIds, generate_id};
use crate::entry::{Entry, ParentEntry};
use crate::registry::RegistryKey;
use serde::{Deserialize, Serialize};

/// Region and zone numbering starts at 1
const DEFAULT_PLACEMENT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeAddRequest {
    #[serde(rename = "ring")]
    pub ring_id: String,
    #[serde(default)]
    pub region: Option<u32>,
    #[serde(default)]
    pub zone: Option<u32>,
    pub ip: String,
    pub port: u16,
    #[serde(default, rename = "replicationIP")]
    pub replication_ip: Option<String>,
    #[serde(default, rename = "replicationPort")]
    pub replication_port: Option<u16>,
}

impl NodeAddRequest {
    pub fn new(ring_id: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            ring_id: ring_id.into(),
            ip: ip.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_placement(mut self, region: u32, zone: u32) -> Self {
        self.region = Some(region);
        self.zone = Some(zone);
        self
    }

    pub fn with_replication(mut self, ip: impl Into<String>, port: u16) -> Self {
        self.replication_ip = Some(ip.into());
        self.replication_port = Some(port);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ring_id.is_empty() {
            return Err(RingError::InvalidRequest("Ring id missing".into()));
        }
        if self.ip.is_empty() {
            return Err(RingError::InvalidRequest("Node ip missing".into()));
        }
        if self.port == 0 {
            return Err(RingError::InvalidRequest("Node port missing".into()));
        }
        Ok(())
    }
}

/// A storage server placed in one ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    id: String,
    ring_id: String,
    region: u32,
    zone: u32,
    ip: String,
    port: u16,
    replication_ip: String,
    replication_port: u16,
    #[serde(default)]
    devices: SortedIds,
}

impl NodeEntry {
    pub fn from_request(req: &NodeAddRequest) -> Result<Self> {
        req.validate()?;

        let placement = |value: Option<u32>| value.filter(|v| *v >= 1).unwrap_or(DEFAULT_PLACEMENT);
        let replication_ip = req
            .replication_ip
            .clone()
            .filter(|ip| !ip.is_empty())
            .unwrap_or_else(|| req.ip.clone());
        let replication_port = req.replication_port.filter(|p| *p != 0).unwrap_or(req.port);

        Ok(Self {
            id: generate_id(),
            ring_id: req.ring_id.clone(),
            region: placement(req.region),
            zone: placement(req.zone),
            ip: req.ip.clone(),
            port: req.port,
            replication_ip,
            replication_port,
            devices: SortedIds::new(),
        })
    }

    pub fn ring_id(&self) -> &str {
        &self.ring_id
    }

    pub fn region(&self) -> u32 {
        self.region
    }

    pub fn zone(&self) -> u32 {
        self.zone
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn replication_ip(&self) -> &str {
        &self.replication_ip
    }

    pub fn replication_port(&self) -> u16 {
        self.replication_port
    }

    pub fn devices(&self) -> &SortedIds {
        &self.devices
    }

    pub fn info(&self) -> NodeInfo {
        NodeInfo {
            id: self.id.clone(),
            ring_id: self.ring_id.clone(),
            region: self.region,
            zone: self.zone,
            ip: self.ip.clone(),
            port: self.port,
            replication_ip: self.replication_ip.clone(),
            replication_port: self.replication_port,
            devices: self.devices.to_vec(),
        }
    }
}

impl Entry for NodeEntry {
    const KIND: EntryKind = EntryKind::Node;

    fn id(&self) -> &str {
        &self.id
    }

    // Keyed on the node's own id, so it can only ever collide with itself.
    fn registry_key(&self) -> Option<RegistryKey> {
        Some(RegistryKey::node(&self.ring_id, &self.id))
    }

    fn child_ids(&self) -> Option<&SortedIds> {
        Some(&self.devices)
    }
}

impl ParentEntry for NodeEntry {
    fn child_ids_mut(&mut self) -> &mut SortedIds {
        &mut self.devices
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    #[serde(rename = "ring")]
    pub ring_id: String,
    pub region: u32,
    pub zone: u32,
    pub ip: String,
    pub port: u16,
    #[serde(rename = "replicationIP")]
    pub replication_ip: String,
    #[serde(rename = "replicationPort")]
    pub replication_port: u16,
    pub devices: Vec<String>,
}
