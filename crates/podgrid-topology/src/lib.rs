//! podgrid-topology: in-memory model of the accelerator cluster.
//!
//! The model is rebuilt from the host's candidate list at the start of
//! every placement attempt and is never shared between attempts.
//!
//! # Architecture
//!
//! ```text
//! Topology
//!   ├── nodes        arena of ComputeNode, indexed by NodeIdx
//!   ├── racks        (super_pod_id, rack_id) → node indices
//!   ├── super_pods   super_pod_id → rack indices + memory groups
//!   └── by_name      node name → NodeIdx
//!
//! OrderedSuperPodTable
//!   row = free nodes in the super-pod, column = position in that bucket
//! ```

pub mod convert;
pub mod error;
pub mod model;
pub mod table;

pub use convert::node_from_labels;
pub use error::{TopologyError, TopologyResult};
pub use model::{BuildOptions, ComputeNode, MemoryGroup, NodeIdx, Rack, RackIdx, SuperPod, Topology};
pub use table::{OrderedSuperPodTable, TablePosition};
