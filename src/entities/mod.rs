//! The four entity kinds of the hierarchy.

pub mod cluster;
pub mod device;
pub mod node;
pub mod ring;

pub use cluster::{ClusterEntry, ClusterInfo};
pub use device::{DeviceAddRequest, DeviceEntry, DeviceInfo, DeviceWeight, DeviceWeightUpdate};
pub use node::{NodeAddRequest, NodeEntry, NodeInfo};
pub use ring::{RingAddRequest, RingEntry, RingInfo};
