//! Ordered super-pod table.
//!
//! Buckets super-pods by how many free nodes they hold so a strategy can
//! jump straight to the best-fit bucket for its demand, walk upward
//! through larger super-pods, then wrap around to the smaller ones.

use crate::model::Topology;

/// A cell in the table: `row` is the free-node bucket, `col` the position
/// inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablePosition {
    pub row: usize,
    pub col: usize,
}

/// Super-pod indices bucketed by free-node count.
#[derive(Debug, Clone, Default)]
pub struct OrderedSuperPodTable {
    /// `rows[n]` holds the super-pods with exactly `n` free nodes,
    /// ascending by super-pod id.
    rows: Vec<Vec<usize>>,
}

impl OrderedSuperPodTable {
    pub fn build(topology: &Topology) -> Self {
        let widest = topology
            .super_pods()
            .iter()
            .map(|p| p.node_count)
            .max()
            .unwrap_or(0);
        let mut rows = vec![Vec::new(); widest + 1];
        for (idx, pod) in topology.super_pods().iter().enumerate() {
            rows[pod.node_count].push(idx);
        }
        Self { rows }
    }

    /// Largest bucket index.
    pub fn max_row(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    pub fn row(&self, row: usize) -> &[usize] {
        self.rows.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, pos: TablePosition) -> Option<usize> {
        self.rows.get(pos.row)?.get(pos.col).copied()
    }

    /// Number of super-pods in the table.
    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    /// Best-fit starting cell for `demand` nodes laid out in blocks of
    /// `block` nodes: the smallest bucket that holds the demand rounded up
    /// to whole blocks, capped at the widest bucket.
    pub fn start_position(&self, demand: usize, block: usize) -> TablePosition {
        let block = block.max(1);
        let wanted = demand.div_ceil(block) * block;
        TablePosition {
            row: wanted.max(block).min(self.max_row()),
            col: 0,
        }
    }

    /// Super-pod indices in search order.
    ///
    /// Starts at `start`, walks the remaining cells of that row, then every
    /// larger row, then wraps to the rows below `start.row` in descending
    /// order. Rows below `min_row` are never visited.
    pub fn walk(&self, start: TablePosition, min_row: usize) -> impl Iterator<Item = usize> + '_ {
        let first = start.row.max(min_row);
        let upward = (first..self.rows.len()).flat_map(move |r| {
            let skip = if r == start.row { start.col } else { 0 };
            self.rows[r].iter().skip(skip).copied()
        });
        let downward = (min_row..first.min(self.rows.len()))
            .rev()
            .flat_map(move |r| self.rows[r].iter().copied());
        upward.chain(downward)
    }
}
