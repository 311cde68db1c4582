use crate::core::{EntryKind, Result, RingError, StoreError};
use crate::entities::{
    ClusterEntry, ClusterInfo, DeviceAddRequest, DeviceEntry, DeviceInfo, DeviceWeightUpdate,
    NodeAddRequest, NodeEntry, NodeInfo, RingAddRequest, RingEntry, RingInfo,
};
use crate::entry::{Entry, ParentEntry};
use crate::storage::{KvRead, KvWrite, StoreConfig};
use crate::transaction::{ReadTxn, Store, WriteTxn};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Cluster hierarchy operations over one store.
///
/// Every method runs in exactly one transaction: a write either commits
/// all of its steps or none of them.
pub struct Topology {
    store: Store,
}

impl Topology {
    /// Open the store and create the entity and registry buckets.
    ///
    /// A read-only store is expected to be initialised already.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let store = Store::open(config).await?;
        if !store.config().read_only {
            store
                .update(|txn| {
                    for bucket in EntryKind::all_buckets() {
                        txn.create_bucket_if_missing(bucket)?;
                    }
                    Ok::<_, StoreError>(())
                })
                .await?;
        }
        Ok(Self { store })
    }

    /// A fresh, non-persistent topology
    pub async fn memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory()).await
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await?;
        Ok(())
    }

    // ========================================================================
    // Create
    // ========================================================================

    pub async fn create_cluster(&self) -> Result<ClusterInfo> {
        let cluster = ClusterEntry::new();
        self.store.update(|txn| cluster.save(txn)).await?;
        info!(cluster = cluster.id(), "cluster created");
        Ok(cluster.info())
    }

    pub async fn add_ring(&self, req: RingAddRequest) -> Result<RingInfo> {
        let ring = RingEntry::from_request(&req)?;
        self.store
            .update(|txn| link_child::<ClusterEntry, _>(txn, ring.cluster_id(), &ring))
            .await?;
        info!(cluster = ring.cluster_id(), ring = ring.id(), name = ring.name(), "ring added");
        Ok(ring.info())
    }

    pub async fn add_node(&self, req: NodeAddRequest) -> Result<NodeInfo> {
        let node = NodeEntry::from_request(&req)?;
        self.store
            .update(|txn| link_child::<RingEntry, _>(txn, node.ring_id(), &node))
            .await?;
        info!(ring = node.ring_id(), node = node.id(), ip = node.ip(), "node added");
        Ok(node.info())
    }

    pub async fn add_device(&self, req: DeviceAddRequest) -> Result<DeviceInfo> {
        let device = DeviceEntry::from_request(&req)?;
        self.store
            .update(|txn| link_child::<NodeEntry, _>(txn, device.node_id(), &device))
            .await?;
        info!(node = device.node_id(), device = device.id(), name = device.name(), "device added");
        Ok(device.info())
    }

    // ========================================================================
    // Delete (never cascades)
    // ========================================================================

    pub async fn delete_cluster(&self, id: &str) -> Result<()> {
        self.store
            .update(|txn| ClusterEntry::load(txn, id)?.delete(txn))
            .await?;
        info!(cluster = id, "cluster deleted");
        Ok(())
    }

    pub async fn delete_ring(&self, id: &str) -> Result<()> {
        self.store
            .update(|txn| {
                let ring = RingEntry::load(txn, id)?;
                unlink_child::<ClusterEntry, _>(txn, ring.cluster_id(), &ring)
            })
            .await?;
        info!(ring = id, "ring deleted");
        Ok(())
    }

    pub async fn delete_node(&self, id: &str) -> Result<()> {
        self.store
            .update(|txn| {
                let node = NodeEntry::load(txn, id)?;
                unlink_child::<RingEntry, _>(txn, node.ring_id(), &node)
            })
            .await?;
        info!(node = id, "node deleted");
        Ok(())
    }

    pub async fn delete_device(&self, id: &str) -> Result<()> {
        self.store
            .update(|txn| {
                let device = DeviceEntry::load(txn, id)?;
                unlink_child::<NodeEntry, _>(txn, device.node_id(), &device)
            })
            .await?;
        info!(device = id, "device deleted");
        Ok(())
    }

    // ========================================================================
    // Update
    // ========================================================================

    pub async fn set_device_weight(&self, id: &str, update: DeviceWeightUpdate) -> Result<DeviceInfo> {
        let info = self
            .store
            .update(|txn| -> Result<DeviceInfo> {
                let mut device = DeviceEntry::load(txn, id)?;
                device.set_weight(update);
                device.save(txn)?;
                Ok(device.info())
            })
            .await?;
        debug!(device = id, current = info.weight.current, target = info.weight.target, "weight set");
        Ok(info)
    }

    // ========================================================================
    // Read
    // ========================================================================

    pub async fn cluster_info(&self, id: &str) -> Result<ClusterInfo> {
        self.store
            .view(|txn| ClusterEntry::load(txn, id).map(|entry| entry.info()))
            .await
    }

    pub async fn ring_info(&self, id: &str) -> Result<RingInfo> {
        self.store
            .view(|txn| RingEntry::load(txn, id).map(|entry| entry.info()))
            .await
    }

    pub async fn node_info(&self, id: &str) -> Result<NodeInfo> {
        self.store
            .view(|txn| NodeEntry::load(txn, id).map(|entry| entry.info()))
            .await
    }

    pub async fn device_info(&self, id: &str) -> Result<DeviceInfo> {
        self.store
            .view(|txn| DeviceEntry::load(txn, id).map(|entry| entry.info()))
            .await
    }

    pub async fn list_clusters(&self) -> Result<Vec<String>> {
        self.store.view(|txn| ClusterEntry::list(txn)).await
    }

    pub async fn list_rings(&self) -> Result<Vec<String>> {
        self.store.view(|txn| RingEntry::list(txn)).await
    }

    pub async fn list_nodes(&self) -> Result<Vec<String>> {
        self.store.view(|txn| NodeEntry::list(txn)).await
    }

    pub async fn list_devices(&self) -> Result<Vec<String>> {
        self.store.view(|txn| DeviceEntry::list(txn)).await
    }

    /// The whole tree under one cluster, read from a single snapshot
    pub async fn cluster_topology(&self, id: &str) -> Result<ClusterTopology> {
        self.store.view(|txn| read_cluster_topology(txn, id)).await
    }
}

// ============================================================================
// Nested view
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    pub id: String,
    pub rings: Vec<RingTopology>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingTopology {
    pub id: String,
    pub name: String,
    pub nodes: Vec<NodeTopology>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTopology {
    pub id: String,
    pub region: u32,
    pub zone: u32,
    pub ip: String,
    pub port: u16,
    #[serde(rename = "replicationIP")]
    pub replication_ip: String,
    #[serde(rename = "replicationPort")]
    pub replication_port: u16,
    pub devices: Vec<DeviceInfo>,
}

impl ClusterTopology {
    pub fn ring(&self, name: &str) -> Option<&RingTopology> {
        self.rings.iter().find(|ring| ring.name == name)
    }

    pub fn device_count(&self) -> usize {
        self.rings
            .iter()
            .flat_map(|ring| &ring.nodes)
            .map(|node| node.devices.len())
            .sum()
    }
}

fn read_cluster_topology(txn: &ReadTxn, id: &str) -> Result<ClusterTopology> {
    let cluster = ClusterEntry::load(txn, id)?;
    let rings = cluster
        .rings()
        .iter()
        .map(|ring_id| -> Result<RingTopology> {
            let ring: RingEntry = load_linked(txn, &cluster, ring_id)?;
            let nodes = ring
                .nodes()
                .iter()
                .map(|node_id| -> Result<NodeTopology> {
                    let node: NodeEntry = load_linked(txn, &ring, node_id)?;
                    let devices = node
                        .devices()
                        .iter()
                        .map(|device_id| {
                            load_linked::<DeviceEntry, _, _>(txn, &node, device_id).map(|d| d.info())
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(NodeTopology {
                        id: node.id().to_string(),
                        region: node.region(),
                        zone: node.zone(),
                        ip: node.ip().to_string(),
                        port: node.port(),
                        replication_ip: node.replication_ip().to_string(),
                        replication_port: node.replication_port(),
                        devices,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(RingTopology {
                id: ring.id().to_string(),
                name: ring.name().to_string(),
                nodes,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ClusterTopology {
        id: cluster.id().to_string(),
        rings,
    })
}

// ============================================================================
// Parent/child steps
// ============================================================================

/// Register `child`, link it into its parent and persist both.
fn link_child<P: ParentEntry, C: Entry>(txn: &mut WriteTxn, parent_id: &str, child: &C) -> Result<()> {
    let mut parent = P::load(txn, parent_id)?;
    child.register(txn)?;
    parent.add_child(child.id());
    parent.save(txn)?;
    child.save(txn)
}

/// Delete `child` and unlink it from its parent.
///
/// A missing parent only warns, so half-linked data can still be removed.
fn unlink_child<P: ParentEntry, C: Entry>(txn: &mut WriteTxn, parent_id: &str, child: &C) -> Result<()> {
    child.delete(txn)?;
    if !P::exists(txn, parent_id)? {
        warn!(
            kind = %C::KIND,
            id = child.id(),
            parent = parent_id,
            "deleted entry had no parent"
        );
        return Ok(());
    }
    let mut parent = P::load(txn, parent_id)?;
    parent.remove_child(child.id());
    parent.save(txn)
}

/// Load a child that `parent` links to; a dangling link is corruption.
fn load_linked<C: Entry, P: Entry, T: KvRead>(txn: &T, parent: &P, id: &str) -> Result<C> {
    C::load(txn, id).map_err(|err| match err {
        RingError::NotFound { .. } => RingError::Storage(StoreError::Inconsistent(format!(
            "{} {} links missing {} {}",
            P::KIND,
            parent.id(),
            C::KIND,
            id
        ))),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Conflict;

    #[tokio::test]
    async fn test_add_ring_links_cluster() {
        let topology = Topology::memory().await.unwrap();
        let cluster = topology.create_cluster().await.unwrap();
        let ring = topology
            .add_ring(RingAddRequest::new(&cluster.id, "account"))
            .await
            .unwrap();

        let cluster = topology.cluster_info(&cluster.id).await.unwrap();
        assert_eq!(cluster.rings, vec![ring.id.clone()]);
        assert_eq!(topology.ring_info(&ring.id).await.unwrap(), ring);
    }

    #[tokio::test]
    async fn test_add_ring_to_missing_cluster() {
        let topology = Topology::memory().await.unwrap();
        let err = topology
            .add_ring(RingAddRequest::new("nope", "account"))
            .await
            .unwrap_err();
        assert!(matches!(err, RingError::NotFound { kind: EntryKind::Cluster, .. }));
        assert!(topology.list_rings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_touches_nothing() {
        let topology = Topology::memory().await.unwrap();
        let version = topology.store().version().await;
        let err = topology
            .add_device(DeviceAddRequest::new("n1", "", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, RingError::InvalidRequest(_)));
        assert_eq!(topology.store().version().await, version);
    }

    #[tokio::test]
    async fn test_delete_node_unlinks_ring() {
        let topology = Topology::memory().await.unwrap();
        let cluster = topology.create_cluster().await.unwrap();
        let ring = topology
            .add_ring(RingAddRequest::new(&cluster.id, "object"))
            .await
            .unwrap();
        let node = topology
            .add_node(NodeAddRequest::new(&ring.id, "10.0.0.1", 6000))
            .await
            .unwrap();
        let device = topology
            .add_device(DeviceAddRequest::new(&node.id, "sdb1", 100))
            .await
            .unwrap();

        let err = topology.delete_node(&node.id).await.unwrap_err();
        assert!(matches!(err.conflict(), Some(Conflict::HasChildren { count: 1, .. })));

        topology.delete_device(&device.id).await.unwrap();
        topology.delete_node(&node.id).await.unwrap();
        assert!(topology.ring_info(&ring.id).await.unwrap().nodes.is_empty());
        assert!(topology.node_info(&node.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_with_missing_parent() {
        let topology = Topology::memory().await.unwrap();
        let device = DeviceEntry::from_request(&DeviceAddRequest::new("gone", "sdb1", 1)).unwrap();
        topology
            .store()
            .update(|txn| {
                device.register(txn)?;
                device.save(txn)
            })
            .await
            .unwrap();

        topology.delete_device(device.id()).await.unwrap();
        assert!(topology.list_devices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_device_weight() {
        let topology = Topology::memory().await.unwrap();
        let cluster = topology.create_cluster().await.unwrap();
        let ring = topology
            .add_ring(RingAddRequest::new(&cluster.id, "object"))
            .await
            .unwrap();
        let node = topology
            .add_node(NodeAddRequest::new(&ring.id, "10.0.0.1", 6000))
            .await
            .unwrap();
        let device = topology
            .add_device(DeviceAddRequest::new(&node.id, "sdb1", 100))
            .await
            .unwrap();

        let info = topology
            .set_device_weight(
                &device.id,
                DeviceWeightUpdate {
                    current: Some(100),
                    target: None,
                },
            )
            .await
            .unwrap();
        assert_eq!((info.weight.current, info.weight.target), (100, 100));
        assert_eq!(topology.device_info(&device.id).await.unwrap(), info);
    }

    #[tokio::test]
    async fn test_cluster_topology_tree() {
        let topology = Topology::memory().await.unwrap();
        let cluster = topology.create_cluster().await.unwrap();
        let ring = topology
            .add_ring(RingAddRequest::new(&cluster.id, "object"))
            .await
            .unwrap();
        topology
            .add_ring(RingAddRequest::new(&cluster.id, "account"))
            .await
            .unwrap();
        let node = topology
            .add_node(NodeAddRequest::new(&ring.id, "10.0.0.1", 6000).with_placement(2, 3))
            .await
            .unwrap();
        for name in ["sdb1", "sdc1"] {
            topology
                .add_device(DeviceAddRequest::new(&node.id, name, 100))
                .await
                .unwrap();
        }

        let tree = topology.cluster_topology(&cluster.id).await.unwrap();
        assert_eq!(tree.rings.len(), 2);
        assert_eq!(tree.device_count(), 2);
        let object = tree.ring("object").unwrap();
        assert_eq!(object.nodes[0].zone, 3);
        let mut names: Vec<_> = object.nodes[0].devices.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["sdb1", "sdc1"]);
        assert!(tree.ring("account").unwrap().nodes.is_empty());
    }

    #[tokio::test]
    async fn test_dangling_link_is_inconsistency() {
        let topology = Topology::memory().await.unwrap();
        let cluster = topology.create_cluster().await.unwrap();
        topology
            .store()
            .update(|txn| {
                let mut entry = ClusterEntry::load(txn, &cluster.id)?;
                entry.add_child("missing-ring");
                entry.save(txn)
            })
            .await
            .unwrap();

        let err = topology.cluster_topology(&cluster.id).await.unwrap_err();
        assert!(matches!(err, RingError::Storage(StoreError::Inconsistent(_))));
    }
}
