//! Per-attempt placement state.
//!
//! One [`Attempt`] is created for every strategy a job runs through. It
//! owns which nodes are taken, how full each rack still is, and which
//! virtual block is being filled. A strategy that fails simply drops its
//! attempt, so nothing leaks into the next strategy or the ledger.

use podgrid_topology::{NodeIdx, RackIdx, Topology};

use crate::admission::BlockShape;

#[derive(Debug, Clone)]
pub(crate) struct Attempt<'t> {
    topology: &'t Topology,
    shape: BlockShape,
    /// Nodes already recorded in the ledger, per virtual block.
    seeded: Vec<usize>,
    /// Nodes picked by this attempt, per virtual block.
    picks: Vec<Vec<NodeIdx>>,
    used: Vec<bool>,
    rack_free: Vec<usize>,
    /// First virtual block that is not yet full.
    cursor: usize,
    degraded: bool,
}

impl<'t> Attempt<'t> {
    /// `seeded[b]` is how many nodes block `b` already holds; its length is
    /// the job's virtual block count.
    pub(crate) fn new(topology: &'t Topology, shape: BlockShape, seeded: Vec<usize>) -> Self {
        let total_blocks = seeded.len();
        let cursor = seeded
            .iter()
            .position(|&n| n < shape.sp_block)
            .unwrap_or(total_blocks);
        Self {
            topology,
            shape,
            seeded,
            picks: vec![Vec::new(); total_blocks],
            used: vec![false; topology.len()],
            rack_free: topology.racks().iter().map(|r| r.nodes.len()).collect(),
            cursor,
            degraded: false,
        }
    }

    pub(crate) fn topology(&self) -> &'t Topology {
        self.topology
    }

    pub(crate) fn shape(&self) -> BlockShape {
        self.shape
    }

    pub(crate) fn total_blocks(&self) -> usize {
        self.seeded.len()
    }

    /// Virtual blocks not yet full (`totalCount`).
    pub(crate) fn remaining_blocks(&self) -> usize {
        self.total_blocks() - self.cursor
    }

    /// Nodes still needed to fill every block.
    pub(crate) fn remaining_nodes(&self) -> usize {
        (self.cursor..self.total_blocks())
            .map(|b| self.shape.sp_block - self.block_len(b))
            .sum()
    }

    /// Nodes picked by this attempt.
    pub(crate) fn placed_nodes(&self) -> usize {
        self.picks.iter().map(Vec::len).sum()
    }

    /// True when the next node would start a fresh virtual block.
    pub(crate) fn is_block_aligned(&self) -> bool {
        self.cursor == self.total_blocks() || self.block_len(self.cursor) == 0
    }

    pub(crate) fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub(crate) fn mark_degraded(&mut self) {
        self.degraded = true;
    }

    pub(crate) fn rack_free(&self, rack: RackIdx) -> usize {
        self.rack_free[rack]
    }

    /// Free nodes in `racks` that can be used as whole tp-blocks.
    pub(crate) fn usable_nodes(&self, racks: &[RackIdx]) -> usize {
        let tp = self.shape.tp_block;
        racks.iter().map(|&r| self.rack_free[r] / tp * tp).sum()
    }

    /// Fill the next `count` virtual blocks from `racks`.
    ///
    /// Each block restarts at the first rack and takes tp-block slices
    /// until it holds an sp-block. The caller has checked feasibility
    /// with [`Self::usable_nodes`]; returns the number of blocks filled.
    pub(crate) fn fill_blocks(&mut self, racks: &[RackIdx], count: usize) -> usize {
        let tp = self.shape.tp_block;
        let mut filled = 0;
        while filled < count && self.cursor < self.total_blocks() {
            let block = self.cursor;
            let mut need = self.shape.sp_block - self.block_len(block);
            for &rack in racks {
                while need >= tp && self.rack_free[rack] >= tp {
                    self.take_from_rack(rack, tp);
                    need -= tp;
                }
                if need == 0 {
                    break;
                }
            }
            if need > 0 {
                break;
            }
            debug_assert_ne!(self.cursor, block);
            filled += 1;
        }
        filled
    }

    /// Take up to `n` free nodes from `rack`, in rack order.
    pub(crate) fn take_from_rack(&mut self, rack: RackIdx, n: usize) -> usize {
        let topology = self.topology;
        let mut taken = 0;
        for &idx in &topology.rack(rack).nodes {
            if taken == n || self.cursor == self.total_blocks() {
                break;
            }
            if !self.used[idx] {
                self.take_node(idx);
                taken += 1;
            }
        }
        taken
    }

    /// Node picks per virtual block.
    pub(crate) fn into_picks(self) -> Vec<Vec<NodeIdx>> {
        self.picks
    }

    fn block_len(&self, block: usize) -> usize {
        self.seeded[block] + self.picks[block].len()
    }

    fn take_node(&mut self, idx: NodeIdx) {
        self.used[idx] = true;
        self.rack_free[self.topology.node(idx).rack] -= 1;
        self.picks[self.cursor].push(idx);
        if self.block_len(self.cursor) == self.shape.sp_block {
            self.cursor += 1;
        }
    }
}
