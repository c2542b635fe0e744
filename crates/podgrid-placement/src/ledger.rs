//! Shared record of placed jobs.
//!
//! The ledger is the only state that outlives a placement call. Entries are
//! append-only: a later call may add nodes to unfilled virtual blocks but
//! never moves a node that is already recorded.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::admission::BlockShape;
use crate::error::{PlacementError, PlacementResult};
use crate::placer::{PlacedNode, Placement};
use crate::strategy::StrategyKind;

#[derive(Debug, Default)]
pub struct PlacementLedger {
    jobs: Mutex<HashMap<String, Placement>>,
}

impl PlacementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Placement>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_ready(&self, job_id: &str) -> bool {
        self.lock().get(job_id).is_some_and(|p| p.ready)
    }

    /// Force the next placement call to re-place the job.
    pub fn clear_ready(&self, job_id: &str) -> bool {
        self.update(job_id, |p| {
            p.ready = false;
        })
        .is_some()
    }

    /// Copy of the entry for `job_id`.
    pub fn snapshot(&self, job_id: &str) -> Option<Placement> {
        self.lock().get(job_id).cloned()
    }

    pub fn forget(&self, job_id: &str) -> Option<Placement> {
        let removed = self.lock().remove(job_id);
        if removed.is_some() {
            debug!(job = job_id, "placement forgotten");
        }
        removed
    }

    /// Keep only the jobs for which `keep` returns true.
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) {
        self.lock().retain(|job, _| keep(job));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Append `blocks` to the job's entry, creating it if needed.
    ///
    /// Nothing is written if any block would exceed the sp-block size.
    pub(crate) fn record(
        &self,
        job_id: &str,
        shape: BlockShape,
        blocks: Vec<Vec<PlacedNode>>,
        strategy: Option<StrategyKind>,
        degraded: bool,
    ) -> PlacementResult<Placement> {
        let mut jobs = self.lock();
        let entry = jobs
            .get(job_id)
            .cloned()
            .unwrap_or_else(|| Placement::empty(job_id, shape, blocks.len()));

        if entry.blocks.len() != blocks.len() {
            return Err(PlacementError::LedgerConflict {
                job: job_id.to_string(),
                block: entry.blocks.len().min(blocks.len()),
            });
        }
        if let Some(block) = entry
            .blocks
            .iter()
            .zip(&blocks)
            .position(|(have, add)| have.len() + add.len() > shape.sp_block)
        {
            return Err(PlacementError::LedgerConflict {
                job: job_id.to_string(),
                block,
            });
        }

        let mut entry = entry;
        for (have, add) in entry.blocks.iter_mut().zip(blocks) {
            have.extend(add);
        }
        if strategy.is_some() {
            entry.strategy = strategy;
        }
        entry.degraded |= degraded;
        entry.ready = entry.is_complete();
        debug!(
            job = job_id,
            nodes = entry.placed_nodes(),
            ready = entry.ready,
            "placement recorded"
        );

        jobs.insert(job_id.to_string(), entry.clone());
        Ok(entry)
    }

    /// Run `f` on the job's entry under the lock.
    pub(crate) fn update<R>(&self, job_id: &str, f: impl FnOnce(&mut Placement) -> R) -> Option<R> {
        self.lock().get_mut(job_id).map(f)
    }
}
