//! Placement strategies: rack, memory group, super-pod, multi-super-pod.
//!
//! A [`StrategyChain`] is built per job and tried in order, each strategy
//! searching a looser locality scope than the one before:
//!
//! 1. **Rack**: the whole job inside one rack
//! 2. **MemoryGroup**: the whole job inside one memory group (memory-group jobs only)
//! 3. **SuperPod**: the whole job inside one super-pod
//! 4. **MultiSuperPod**: sp-blocks spread over several super-pods, with an
//!    optional soft pass that gives up tp-block locality

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use podgrid_core::JobSpec;
use podgrid_topology::{OrderedSuperPodTable, RackIdx, Topology};

use crate::attempt::Attempt;
use crate::error::PlacementError;

/// Which strategy produced a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    Rack,
    MemoryGroup,
    SuperPod,
    MultiSuperPod,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rack => "RackSchedule",
            Self::MemoryGroup => "MemoryGroupSchedule",
            Self::SuperPod => "SuperPodSchedule",
            Self::MultiSuperPod => "MultiSuperPodSchedule",
        };
        f.write_str(name)
    }
}

/// One step of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Rack,
    MemoryGroup,
    SuperPod,
    /// `soft` enables the degraded pass once strict search runs dry.
    MultiSuperPod { soft: bool },
}

/// Why a strategy gave up, and whether the chain may continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub try_next: bool,
    pub error: PlacementError,
}

impl StrategyFailure {
    fn retry(error: PlacementError) -> Self {
        Self {
            try_next: true,
            error,
        }
    }

    fn terminal(error: PlacementError) -> Self {
        Self {
            try_next: false,
            error,
        }
    }
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Rack => StrategyKind::Rack,
            Self::MemoryGroup => StrategyKind::MemoryGroup,
            Self::SuperPod => StrategyKind::SuperPod,
            Self::MultiSuperPod { .. } => StrategyKind::MultiSuperPod,
        }
    }

    /// Search `table` and fill the attempt's outstanding virtual blocks.
    pub(crate) fn entry_select(
        &self,
        job_id: &str,
        table: &OrderedSuperPodTable,
        attempt: &mut Attempt<'_>,
    ) -> Result<(), StrategyFailure> {
        if attempt.remaining_blocks() == 0 {
            return Ok(());
        }
        match self {
            Self::Rack => self.select_rack(job_id, table, attempt),
            Self::MemoryGroup => self.select_whole_job(job_id, table, attempt, |pod, topo| {
                topo.super_pod(pod)
                    .memory_groups
                    .iter()
                    .map(|g| g.racks.clone())
                    .collect()
            }),
            Self::SuperPod => self.select_whole_job(job_id, table, attempt, |pod, topo| {
                vec![topo.super_pod(pod).racks.clone()]
            }),
            Self::MultiSuperPod { soft } => self.select_multi(job_id, table, attempt, *soft),
        }
    }

    fn exhausted(&self, job_id: &str, attempt: &Attempt<'_>) -> StrategyFailure {
        StrategyFailure::retry(PlacementError::StrategyExhausted {
            job: job_id.to_string(),
            strategy: self.kind(),
            unplaced: attempt.remaining_blocks(),
            total: attempt.total_blocks(),
        })
    }

    /// Best-fit single rack for the whole outstanding demand.
    fn select_rack(
        &self,
        job_id: &str,
        table: &OrderedSuperPodTable,
        attempt: &mut Attempt<'_>,
    ) -> Result<(), StrategyFailure> {
        let topology = attempt.topology();
        let shape = attempt.shape();

        // Busy or unhealthy nodes still count here: a full cluster is a
        // capacity shortage, not an impossible request.
        if shape.tp_block == 1 && topology.widest_rack() < shape.tp_block {
            return Err(StrategyFailure::terminal(PlacementError::TopologyImpossible {
                job: job_id.to_string(),
                strategy: self.kind(),
            }));
        }
        if !attempt.is_block_aligned() {
            return Err(self.exhausted(job_id, attempt));
        }

        let demand = attempt.remaining_nodes();
        let start = table.start_position(demand, shape.sp_block);
        let mut best: Option<(usize, RackIdx)> = None;
        for pod in table.walk(start, demand) {
            for &rack in &topology.super_pod(pod).racks {
                let free = attempt.rack_free(rack);
                if free >= demand && best.is_none_or(|(size, _)| free < size) {
                    best = Some((free, rack));
                }
            }
        }

        let Some((free, rack)) = best else {
            return Err(self.exhausted(job_id, attempt));
        };
        let blocks = attempt.remaining_blocks();
        attempt.fill_blocks(&[rack], blocks);
        debug!(
            job = job_id,
            super_pod = topology.rack(rack).super_pod_id,
            rack = topology.rack(rack).rack_id,
            free,
            demand,
            "job fits in a single rack"
        );
        Ok(())
    }

    /// First scope, in table order, that can hold every outstanding block.
    ///
    /// `scopes` lists the candidate rack sets of one super-pod.
    fn select_whole_job(
        &self,
        job_id: &str,
        table: &OrderedSuperPodTable,
        attempt: &mut Attempt<'_>,
        scopes: impl Fn(usize, &Topology) -> Vec<Vec<RackIdx>>,
    ) -> Result<(), StrategyFailure> {
        if !attempt.is_block_aligned() {
            return Err(self.exhausted(job_id, attempt));
        }
        let topology = attempt.topology();
        let shape = attempt.shape();
        let demand = attempt.remaining_nodes();
        let start = table.start_position(demand, shape.sp_block);

        for pod in table.walk(start, demand) {
            for racks in scopes(pod, topology) {
                if attempt.usable_nodes(&racks) < demand {
                    continue;
                }
                let blocks = attempt.remaining_blocks();
                attempt.fill_blocks(&racks, blocks);
                debug!(
                    job = job_id,
                    strategy = %self.kind(),
                    super_pod = topology.super_pod(pod).id,
                    racks = racks.len(),
                    demand,
                    "job fits in one scope"
                );
                return Ok(());
            }
        }
        Err(self.exhausted(job_id, attempt))
    }

    /// Spread sp-blocks over super-pods, then optionally relax tp-blocks.
    fn select_multi(
        &self,
        job_id: &str,
        table: &OrderedSuperPodTable,
        attempt: &mut Attempt<'_>,
        soft: bool,
    ) -> Result<(), StrategyFailure> {
        let topology = attempt.topology();
        let shape = attempt.shape();

        if attempt.is_block_aligned() {
            let start = table.start_position(attempt.remaining_nodes(), shape.sp_block);
            for pod in table.walk(start, shape.sp_block) {
                let remaining = attempt.remaining_blocks();
                if remaining == 0 {
                    break;
                }
                let racks = &topology.super_pod(pod).racks;
                let fits = (attempt.usable_nodes(racks) / shape.sp_block).min(remaining);
                if fits > 0 {
                    let filled = attempt.fill_blocks(racks, fits);
                    debug!(
                        job = job_id,
                        super_pod = topology.super_pod(pod).id,
                        blocks = filled,
                        "placed sp-blocks in super-pod"
                    );
                }
            }
        }
        if attempt.remaining_blocks() == 0 {
            return Ok(());
        }
        if !soft {
            return Err(self.exhausted(job_id, attempt));
        }

        let strict = attempt.placed_nodes();
        soft_fill(attempt);
        let shortfall = attempt.remaining_nodes();
        info!(
            job = job_id,
            strict_nodes = strict,
            soft_nodes = attempt.placed_nodes() - strict,
            shortfall,
            "soft pass finished"
        );
        if shortfall == 0 {
            return Ok(());
        }
        Err(StrategyFailure::terminal(PlacementError::SoftShortfall {
            job: job_id.to_string(),
            placed: attempt.placed_nodes(),
            shortfall,
        }))
    }
}

/// Degraded fill: ignore tp-blocks and drain racks across the whole
/// cluster, largest first, one node per task.
fn soft_fill(attempt: &mut Attempt<'_>) {
    let mut racks: Vec<(usize, RackIdx)> = (0..attempt.topology().racks().len())
        .map(|r| (attempt.rack_free(r), r))
        .filter(|&(free, _)| free > 0)
        .collect();
    racks.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    for (_, rack) in racks {
        let need = attempt.remaining_nodes();
        if need == 0 {
            return;
        }
        if attempt.take_from_rack(rack, need) > 0 {
            attempt.mark_degraded();
        }
    }
}

/// Ordered strategies for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyChain {
    strategies: Vec<Strategy>,
}

/// What a chain run produced.
#[derive(Debug)]
pub(crate) enum ChainOutcome<'t> {
    Placed {
        strategy: StrategyKind,
        attempt: Attempt<'t>,
    },
    /// Soft pass committed some nodes but not all.
    Partial {
        attempt: Attempt<'t>,
        error: PlacementError,
    },
    Failed(PlacementError),
}

impl StrategyChain {
    /// The full chain for a job that has nothing recorded yet.
    pub fn for_job(job: &JobSpec) -> Self {
        let mut strategies = vec![Strategy::Rack];
        if job.memory_group_scene {
            strategies.push(Strategy::MemoryGroup);
        }
        strategies.push(Strategy::SuperPod);
        strategies.push(Strategy::MultiSuperPod {
            soft: job.soft_affinity,
        });
        Self { strategies }
    }

    /// Chain for finishing a job the soft pass left incomplete.
    pub fn soft_continuation() -> Self {
        Self {
            strategies: vec![Strategy::MultiSuperPod { soft: true }],
        }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Try each strategy on a fresh attempt until one places the job.
    pub(crate) fn run<'t>(
        &self,
        job_id: &str,
        table: &OrderedSuperPodTable,
        mut fresh: impl FnMut() -> Attempt<'t>,
    ) -> ChainOutcome<'t> {
        let mut last = PlacementError::NotPlaced(job_id.to_string());
        for strategy in &self.strategies {
            let mut attempt = fresh();
            match strategy.entry_select(job_id, table, &mut attempt) {
                Ok(()) => {
                    info!(
                        job = job_id,
                        strategy = %strategy.kind(),
                        nodes = attempt.placed_nodes(),
                        degraded = attempt.is_degraded(),
                        "job placed"
                    );
                    return ChainOutcome::Placed {
                        strategy: strategy.kind(),
                        attempt,
                    };
                }
                Err(StrategyFailure {
                    error: error @ PlacementError::SoftShortfall { .. },
                    ..
                }) => {
                    warn!(job = job_id, error = %error, "soft placement incomplete");
                    return ChainOutcome::Partial { attempt, error };
                }
                Err(StrategyFailure {
                    try_next: false,
                    error,
                }) => {
                    warn!(job = job_id, strategy = %strategy.kind(), error = %error, "terminal placement failure");
                    return ChainOutcome::Failed(error);
                }
                Err(StrategyFailure { error, .. }) => {
                    debug!(job = job_id, strategy = %strategy.kind(), error = %error, "strategy failed, trying next");
                    last = error;
                }
            }
        }
        ChainOutcome::Failed(PlacementError::SchedulingFailed {
            job: job_id.to_string(),
            last: Box::new(last),
        })
    }
}
