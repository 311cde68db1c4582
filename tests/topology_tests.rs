//! End-to-end hierarchy tests through the `Topology` facade

use ringmaster::entities::{ClusterEntry, RingEntry};
use ringmaster::entry::{Entry, ParentEntry};
use ringmaster::registry::{self, RegistryKey};
use ringmaster::{
    Conflict, DeviceAddRequest, EntryKind, NodeAddRequest, RingAddRequest, RingError, Topology,
};
use std::sync::Arc;

async fn cluster_with_node(topology: &Topology) -> (String, String, String) {
    let cluster = topology.create_cluster().await.unwrap();
    let ring = topology
        .add_ring(RingAddRequest::new(&cluster.id, "object"))
        .await
        .unwrap();
    let node = topology
        .add_node(NodeAddRequest::new(&ring.id, "10.0.0.1", 6000))
        .await
        .unwrap();
    (cluster.id, ring.id, node.id)
}

#[tokio::test]
async fn test_cluster_ring_lifecycle() {
    let topology = Topology::memory().await.unwrap();

    let cluster = topology.create_cluster().await.unwrap();
    assert!(cluster.rings.is_empty());

    let ring = topology
        .add_ring(RingAddRequest::new(&cluster.id, "account"))
        .await
        .unwrap();
    assert_eq!(topology.cluster_info(&cluster.id).await.unwrap().rings, vec![ring.id.clone()]);

    let err = topology.delete_cluster(&cluster.id).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Unable to delete cluster [{}] because it contains 1 ring(s)", cluster.id)
    );
    // a refused delete leaves everything in place
    assert_eq!(topology.cluster_info(&cluster.id).await.unwrap().rings, vec![ring.id.clone()]);
    assert_eq!(topology.ring_info(&ring.id).await.unwrap(), ring);

    topology.delete_ring(&ring.id).await.unwrap();
    topology.delete_cluster(&cluster.id).await.unwrap();
    assert!(topology.list_clusters().await.unwrap().is_empty());
    assert!(topology.list_rings().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_device_name_on_node() {
    let topology = Topology::memory().await.unwrap();
    let (_, _, node_id) = cluster_with_node(&topology).await;

    let first = topology
        .add_device(DeviceAddRequest::new(&node_id, "sdb1", 100))
        .await
        .unwrap();
    let err = topology
        .add_device(DeviceAddRequest::new(&node_id, "sdb1", 200))
        .await
        .unwrap_err();

    match err.conflict() {
        Some(Conflict::KeyInUse {
            kind, existing_id, ..
        }) => {
            assert_eq!(*kind, EntryKind::Device);
            assert_eq!(existing_id, &first.id);
        }
        other => panic!("expected KeyInUse, got {other:?}"),
    }
    assert!(err.to_string().contains(&first.id));

    let node = topology.node_info(&node_id).await.unwrap();
    assert_eq!(node.devices, vec![first.id.clone()]);
    assert_eq!(topology.list_devices().await.unwrap(), vec![first.id]);
}

#[tokio::test]
async fn test_ring_name_unique_per_cluster() {
    let topology = Topology::memory().await.unwrap();
    let a = topology.create_cluster().await.unwrap();
    let b = topology.create_cluster().await.unwrap();

    topology.add_ring(RingAddRequest::new(&a.id, "container")).await.unwrap();
    let err = topology
        .add_ring(RingAddRequest::new(&a.id, "container"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    topology.add_ring(RingAddRequest::new(&b.id, "container")).await.unwrap();
    assert_eq!(topology.cluster_info(&a.id).await.unwrap().rings.len(), 1);
    assert_eq!(topology.list_rings().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_ring_name_with_path_components_is_rejected() {
    let topology = Topology::memory().await.unwrap();
    let cluster = topology.create_cluster().await.unwrap();

    let err = topology
        .add_ring(RingAddRequest::new(&cluster.id, "../../etc/cron.d/ring"))
        .await
        .unwrap_err();
    assert!(matches!(err, RingError::InvalidRequest(_)));
    assert!(topology.cluster_info(&cluster.id).await.unwrap().rings.is_empty());
    assert!(topology.list_rings().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_name_reusable_after_delete() {
    let topology = Topology::memory().await.unwrap();
    let (_, _, node_id) = cluster_with_node(&topology).await;

    let device = topology
        .add_device(DeviceAddRequest::new(&node_id, "sdb1", 100))
        .await
        .unwrap();
    topology.delete_device(&device.id).await.unwrap();

    let again = topology
        .add_device(DeviceAddRequest::new(&node_id, "sdb1", 100))
        .await
        .unwrap();
    assert_ne!(again.id, device.id);
    assert_eq!(topology.node_info(&node_id).await.unwrap().devices, vec![again.id]);
}

#[tokio::test]
async fn test_children_listed_in_sorted_order() {
    let topology = Topology::memory().await.unwrap();
    let (_, _, node_id) = cluster_with_node(&topology).await;

    let mut ids = Vec::new();
    for name in ["sdb1", "sdc1", "sdd1", "sde1", "sdf1"] {
        let device = topology
            .add_device(DeviceAddRequest::new(&node_id, name, 10))
            .await
            .unwrap();
        ids.push(device.id);
    }
    topology.delete_device(&ids[2]).await.unwrap();
    ids.remove(2);
    ids.sort();

    assert_eq!(topology.node_info(&node_id).await.unwrap().devices, ids);
}

#[tokio::test]
async fn test_failed_transaction_leaves_no_trace() {
    let topology = Topology::memory().await.unwrap();
    let cluster = topology.create_cluster().await.unwrap();
    let ring = RingEntry::from_request(&RingAddRequest::new(&cluster.id, "object")).unwrap();
    let key = RegistryKey::ring(&cluster.id, "object");

    let err = topology
        .store()
        .update(|txn| -> ringmaster::Result<()> {
            let mut parent = ClusterEntry::load(txn, &cluster.id)?;
            ring.register(txn)?;
            parent.add_child(ring.id());
            parent.save(txn)?;
            Err(RingError::InvalidRequest("injected failure".into()))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RingError::InvalidRequest(_)));

    assert!(topology.cluster_info(&cluster.id).await.unwrap().rings.is_empty());
    let record = topology
        .store()
        .view(|txn| registry::lookup(txn, &key))
        .await
        .unwrap();
    assert_eq!(record, None);
    assert!(topology.ring_info(ring.id()).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_stale_registration_is_reclaimed() {
    let topology = Topology::memory().await.unwrap();
    let cluster = topology.create_cluster().await.unwrap();
    let key = RegistryKey::ring(&cluster.id, "object");

    // a registry record whose ring was never saved
    let ghost = RingEntry::from_request(&RingAddRequest::new(&cluster.id, "object")).unwrap();
    topology
        .store()
        .update(|txn| ghost.register(txn))
        .await
        .unwrap();

    let ring = topology
        .add_ring(RingAddRequest::new(&cluster.id, "object"))
        .await
        .unwrap();
    let record = topology
        .store()
        .view(|txn| registry::lookup(txn, &key))
        .await
        .unwrap();
    assert_eq!(record, Some(ring.id.clone()));
    assert_eq!(topology.cluster_info(&cluster.id).await.unwrap().rings, vec![ring.id]);
}

#[tokio::test]
async fn test_missing_parents_are_not_found() {
    let topology = Topology::memory().await.unwrap();

    let err = topology
        .add_node(NodeAddRequest::new("no-ring", "10.0.0.1", 6000))
        .await
        .unwrap_err();
    assert!(matches!(err, RingError::NotFound { kind: EntryKind::Ring, .. }));

    let err = topology
        .add_device(DeviceAddRequest::new("no-node", "sdb1", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, RingError::NotFound { kind: EntryKind::Node, .. }));
    assert!(topology.list_devices().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_device_adds_link_every_device() {
    let topology = Arc::new(Topology::memory().await.unwrap());
    let (_, _, node_id) = cluster_with_node(&topology).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let topology = Arc::clone(&topology);
        let node_id = node_id.clone();
        handles.push(tokio::spawn(async move {
            topology
                .add_device(DeviceAddRequest::new(node_id, format!("sd{i}"), 10))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let node = topology.node_info(&node_id).await.unwrap();
    assert_eq!(node.devices.len(), 16);
    assert_eq!(topology.list_devices().await.unwrap().len(), 16);
}

#[tokio::test]
async fn test_concurrent_same_name_only_one_wins() {
    let topology = Arc::new(Topology::memory().await.unwrap());
    let (_, _, node_id) = cluster_with_node(&topology).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let topology = Arc::clone(&topology);
        let node_id = node_id.clone();
        handles.push(tokio::spawn(async move {
            topology
                .add_device(DeviceAddRequest::new(node_id, "sdb1", 10))
                .await
        }));
    }
    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(err) => assert!(err.is_conflict()),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(topology.node_info(&node_id).await.unwrap().devices.len(), 1);
}
