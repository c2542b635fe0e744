//! Arena representation of the cluster hierarchy.
//!
//! Nodes live in a single `Vec`; racks, memory groups and super-pods hold
//! index lists into it. The strategies walk these index lists instead of
//! string-keyed maps.

use std::collections::{BTreeMap, HashMap, HashSet};

use podgrid_core::{NodeSpec, PlacementConfig};
use tracing::{debug, warn};

use crate::error::{TopologyError, TopologyResult};

/// Index of a node in [`Topology::nodes`].
pub type NodeIdx = usize;

/// Index of a rack in [`Topology::racks`].
pub type RackIdx = usize;

/// A schedulable compute node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeNode {
    pub name: String,
    pub super_pod_id: u32,
    pub rack_id: u32,
    pub memory_group_id: u32,
    pub rack: RackIdx,
}

/// Nodes sharing a rack id inside one super-pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rack {
    pub super_pod_id: u32,
    pub rack_id: u32,
    pub memory_group_id: u32,
    /// Node indices, sorted by node name.
    pub nodes: Vec<NodeIdx>,
}

/// Contiguous racks sharing a memory fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryGroup {
    pub id: u32,
    pub racks: Vec<RackIdx>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperPod {
    pub id: u32,
    /// Rack indices, ascending by rack id.
    pub racks: Vec<RackIdx>,
    /// Memory groups, ascending by group id.
    pub memory_groups: Vec<MemoryGroup>,
    pub node_count: usize,
}

/// Parameters that shape a [`Topology`] build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Free NPUs a node needs to be a candidate at all.
    pub required_npus: u32,
    /// Nodes kept per super-pod.
    pub super_pod_size: usize,
    pub memory_group_rack_span: u32,
}

impl BuildOptions {
    /// Options for whole-node placement under `config`.
    pub fn from_config(config: &PlacementConfig) -> Self {
        Self {
            required_npus: config.node_npu_capacity,
            super_pod_size: config.super_pod_size as usize,
            memory_group_rack_span: config.memory_group_rack_span,
        }
    }

    pub fn with_required_npus(mut self, required_npus: u32) -> Self {
        self.required_npus = required_npus;
        self
    }
}

/// The cluster hierarchy for one placement attempt.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: Vec<ComputeNode>,
    racks: Vec<Rack>,
    super_pods: Vec<SuperPod>,
    by_name: HashMap<String, NodeIdx>,
    rack_index: BTreeMap<(u32, u32), RackIdx>,
    super_pod_index: BTreeMap<u32, usize>,
    widest_rack: usize,
}

impl Topology {
    /// Build the hierarchy from the host's candidate nodes.
    ///
    /// Unhealthy nodes and nodes with fewer than `required_npus` free NPUs
    /// are left out. The result does not depend on input order.
    pub fn build(specs: &[NodeSpec], opts: &BuildOptions) -> TopologyResult<Self> {
        let mut seen = HashSet::with_capacity(specs.len());
        let mut rack_sizes: HashMap<(u32, u32), usize> = HashMap::new();
        let mut usable: Vec<&NodeSpec> = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(TopologyError::DuplicateNode(spec.name.clone()));
            }
            *rack_sizes.entry((spec.super_pod_id, spec.rack_id)).or_default() += 1;
            if spec.unhealthy {
                debug!(node = %spec.name, "skipping unhealthy node");
                continue;
            }
            if spec.idle_npus < opts.required_npus {
                debug!(
                    node = %spec.name,
                    idle = spec.idle_npus,
                    required = opts.required_npus,
                    "skipping node without enough idle NPUs"
                );
                continue;
            }
            usable.push(spec);
        }
        usable.sort_by(|a, b| {
            (a.super_pod_id, a.rack_id, &a.name).cmp(&(b.super_pod_id, b.rack_id, &b.name))
        });

        let span = opts.memory_group_rack_span.max(1);
        let mut topo = Topology {
            widest_rack: rack_sizes.values().copied().max().unwrap_or(0),
            ..Topology::default()
        };

        for pod_nodes in usable.chunk_by(|a, b| a.super_pod_id == b.super_pod_id) {
            let super_pod_id = pod_nodes[0].super_pod_id;
            let kept = if pod_nodes.len() > opts.super_pod_size {
                warn!(
                    super_pod = super_pod_id,
                    nodes = pod_nodes.len(),
                    limit = opts.super_pod_size,
                    "super-pod exceeds configured size, truncating"
                );
                &pod_nodes[..opts.super_pod_size]
            } else {
                pod_nodes
            };
            if kept.is_empty() {
                continue;
            }

            let mut super_pod = SuperPod {
                id: super_pod_id,
                racks: Vec::new(),
                memory_groups: Vec::new(),
                node_count: kept.len(),
            };
            let mut groups: BTreeMap<u32, Vec<RackIdx>> = BTreeMap::new();

            for rack_nodes in kept.chunk_by(|a, b| a.rack_id == b.rack_id) {
                let first = rack_nodes[0];
                let rack_idx = topo.racks.len();
                let memory_group_id = first.memory_group_id.unwrap_or(first.rack_id / span);
                let mut rack = Rack {
                    super_pod_id,
                    rack_id: first.rack_id,
                    memory_group_id,
                    nodes: Vec::with_capacity(rack_nodes.len()),
                };
                for spec in rack_nodes {
                    let idx = topo.nodes.len();
                    topo.nodes.push(ComputeNode {
                        name: spec.name.clone(),
                        super_pod_id,
                        rack_id: spec.rack_id,
                        memory_group_id,
                        rack: rack_idx,
                    });
                    topo.by_name.insert(spec.name.clone(), idx);
                    rack.nodes.push(idx);
                }
                topo.rack_index.insert((super_pod_id, first.rack_id), rack_idx);
                groups.entry(memory_group_id).or_default().push(rack_idx);
                super_pod.racks.push(rack_idx);
                topo.racks.push(rack);
            }

            super_pod.memory_groups = groups
                .into_iter()
                .map(|(id, racks)| MemoryGroup { id, racks })
                .collect();
            topo.super_pod_index.insert(super_pod_id, topo.super_pods.len());
            topo.super_pods.push(super_pod);
        }

        debug!(
            nodes = topo.nodes.len(),
            racks = topo.racks.len(),
            super_pods = topo.super_pods.len(),
            "topology built"
        );
        Ok(topo)
    }

    pub fn nodes(&self) -> &[ComputeNode] {
        &self.nodes
    }

    pub fn node(&self, idx: NodeIdx) -> &ComputeNode {
        &self.nodes[idx]
    }

    pub fn racks(&self) -> &[Rack] {
        &self.racks
    }

    pub fn rack(&self, idx: RackIdx) -> &Rack {
        &self.racks[idx]
    }

    pub fn super_pods(&self) -> &[SuperPod] {
        &self.super_pods
    }

    pub fn super_pod(&self, idx: usize) -> &SuperPod {
        &self.super_pods[idx]
    }

    pub fn index_of(&self, name: &str) -> Option<NodeIdx> {
        self.by_name.get(name).copied()
    }

    pub fn rack_by_id(&self, super_pod_id: u32, rack_id: u32) -> Option<&Rack> {
        self.rack_index
            .get(&(super_pod_id, rack_id))
            .map(|&idx| &self.racks[idx])
    }

    pub fn super_pod_by_id(&self, super_pod_id: u32) -> Option<&SuperPod> {
        self.super_pod_index
            .get(&super_pod_id)
            .map(|&idx| &self.super_pods[idx])
    }

    /// Node count of the largest rack among all candidates, counting nodes
    /// that were filtered out as busy or unhealthy.
    pub fn widest_rack(&self) -> usize {
        self.widest_rack
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
