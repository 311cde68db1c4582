// ============================================================================
// Ringmaster Library
// ============================================================================
//
// Clusters, rings, nodes and devices of an object-storage deployment, kept
// in an embedded transactional bucket store, with uniqueness of business
// keys enforced by registry records.
//
// ============================================================================

//! # Example
//!
//! ```
//! use ringmaster::{NodeAddRequest, RingAddRequest, Topology};
//!
//! # #[tokio::main]
//! # async fn main() -> ringmaster::Result<()> {
//! let topology = Topology::memory().await?;
//! let cluster = topology.create_cluster().await?;
//! let ring = topology.add_ring(RingAddRequest::new(&cluster.id, "object")).await?;
//! let node = topology
//!     .add_node(NodeAddRequest::new(&ring.id, "10.0.0.1", 6000))
//!     .await?;
//!
//! assert_eq!(topology.ring_info(&ring.id).await?.nodes, vec![node.id]);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod core;
pub mod entities;
pub mod entry;
pub mod facade;
pub mod registry;
pub mod storage;
pub mod transaction;

pub use builder::{BuildError, BuilderSettings, RingBuildOutcome, RingBuildPlan, RingBuilder};
pub use config::{Settings, SettingsError};
pub use core::{Conflict, EntryKind, Result, RingError, StoreError};
pub use entities::{
    ClusterInfo, DeviceAddRequest, DeviceInfo, DeviceWeight, DeviceWeightUpdate, NodeAddRequest,
    NodeInfo, RingAddRequest, RingInfo,
};
pub use facade::{ClusterTopology, NodeTopology, RingTopology, Topology};
pub use storage::{DurabilityMode, StoreConfig};
pub use transaction::Store;
