pub mod topology;

pub use topology::{ClusterTopology, NodeTopology, RingTopology, Topology};
