use crate::core::{EntryKind, Result, RingError, generate_id};
use crate::entry::Entry;
use crate::registry::RegistryKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceAddRequest {
    #[serde(rename = "node")]
    pub node_id: String,
    pub name: String,
    #[serde(default)]
    pub meta: String,
    #[serde(default)]
    pub weight: u64,
}

impl DeviceAddRequest {
    pub fn new(node_id: impl Into<String>, name: impl Into<String>, weight: u64) -> Self {
        Self {
            node_id: node_id.into(),
            name: name.into(),
            meta: String::new(),
            weight,
        }
    }

    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = meta.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(RingError::InvalidRequest("Node id missing".into()));
        }
        if self.name.is_empty() {
            return Err(RingError::InvalidRequest("Device name missing".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceWeight {
    pub current: u64,
    pub target: u64,
}

/// Partial weight change; `None` leaves the field as it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceWeightUpdate {
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub target: Option<u64>,
}

/// A disk on a node. Devices are leaves of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    id: String,
    node_id: String,
    name: String,
    #[serde(default)]
    meta: String,
    #[serde(default)]
    weight: DeviceWeight,
}

impl DeviceEntry {
    /// The requested weight becomes the target; nothing is assigned yet.
    pub fn from_request(req: &DeviceAddRequest) -> Result<Self> {
        req.validate()?;
        Ok(Self {
            id: generate_id(),
            node_id: req.node_id.clone(),
            name: req.name.clone(),
            meta: req.meta.clone(),
            weight: DeviceWeight {
                current: 0,
                target: req.weight,
            },
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meta(&self) -> &str {
        &self.meta
    }

    pub fn weight(&self) -> DeviceWeight {
        self.weight
    }

    pub fn set_weight(&mut self, update: DeviceWeightUpdate) {
        if let Some(current) = update.current {
            self.weight.current = current;
        }
        if let Some(target) = update.target {
            self.weight.target = target;
        }
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id.clone(),
            node_id: self.node_id.clone(),
            name: self.name.clone(),
            meta: self.meta.clone(),
            weight: self.weight,
        }
    }
}

impl Entry for DeviceEntry {
    const KIND: EntryKind = EntryKind::Device;

    fn id(&self) -> &str {
        &self.id
    }

    fn registry_key(&self) -> Option<RegistryKey> {
        Some(RegistryKey::device(&self.node_id, &self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    #[serde(rename = "node")]
    pub node_id: String,
    pub name: String,
    pub meta: String,
    pub weight: DeviceWeight,
}
