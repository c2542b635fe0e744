//! Placement engine: coordinates admission, search and the ledger.
//!
//! Given a job and the host's candidate nodes, the engine:
//! 1. Derives the job's block shape (admission gate)
//! 2. Reuses the committed placement if the job is already ready
//! 3. Builds a fresh topology and runs the strategy chain
//! 4. Commits the result to the shared ledger

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use podgrid_core::{JobSpec, NodeSpec, PlacementConfig, TaskSpec};
use podgrid_topology::{BuildOptions, OrderedSuperPodTable, Topology};

use crate::admission::{AdmissionGate, BlockShape, ValidateResult};
use crate::attempt::Attempt;
use crate::error::{PlacementError, PlacementResult};
use crate::ledger::PlacementLedger;
use crate::scorer;
use crate::strategy::{ChainOutcome, StrategyChain, StrategyKind};

/// A node chosen for one rank of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedNode {
    pub name: String,
    pub super_pod_id: u32,
    pub rack_id: u32,
}

/// The nodes recorded for a job, grouped by virtual block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub job_id: String,
    pub shape: BlockShape,
    /// Virtual block index → nodes in local-rank order. Always one entry
    /// per virtual block; unfilled blocks are empty.
    pub blocks: Vec<Vec<PlacedNode>>,
    /// Strategy that completed the placement.
    pub strategy: Option<StrategyKind>,
    /// Some nodes were chosen by the soft pass.
    pub degraded: bool,
    /// Complete and safe to reconfirm instead of re-placing.
    pub ready: bool,
}

/// One row of [`Placement::rank_table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankAssignment {
    pub rank: usize,
    pub block: usize,
    pub local_rank: usize,
    pub node: String,
    pub super_pod_id: u32,
    pub rack_id: u32,
}

impl Placement {
    pub(crate) fn empty(job_id: &str, shape: BlockShape, total_blocks: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            shape,
            blocks: vec![Vec::new(); total_blocks],
            strategy: None,
            degraded: false,
            ready: false,
        }
    }

    pub fn placed_nodes(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.blocks.iter().all(|b| b.len() == self.shape.sp_block)
    }

    /// Node recorded for `rank`: block `rank / sp_block`, position `rank % sp_block`.
    pub fn node_for_rank(&self, rank: usize) -> Option<&PlacedNode> {
        let sp_block = self.shape.sp_block;
        self.blocks.get(rank / sp_block)?.get(rank % sp_block)
    }

    /// Every recorded rank with its node, in rank order.
    pub fn rank_table(&self) -> Vec<RankAssignment> {
        let sp_block = self.shape.sp_block;
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(block, nodes)| {
                nodes.iter().enumerate().map(move |(local_rank, node)| RankAssignment {
                    rank: block * sp_block + local_rank,
                    block,
                    local_rank,
                    node: node.name.clone(),
                    super_pod_id: node.super_pod_id,
                    rack_id: node.rack_id,
                })
            })
            .collect()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().flatten().map(|n| n.name.as_str())
    }
}

/// Entry point the host scheduler drives once per job and task.
#[derive(Debug, Clone)]
pub struct PlacementEngine {
    config: PlacementConfig,
    ledger: Arc<PlacementLedger>,
}

impl PlacementEngine {
    pub fn new(config: PlacementConfig) -> Self {
        Self::with_ledger(config, Arc::new(PlacementLedger::new()))
    }

    /// Share a ledger between engine instances (e.g. one per worker thread).
    pub fn with_ledger(config: PlacementConfig, ledger: Arc<PlacementLedger>) -> Self {
        Self { config, ledger }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<PlacementLedger> {
        &self.ledger
    }

    /// Admission check (`ValidateJob`).
    pub fn validate_job(&self, job: &JobSpec) -> ValidateResult {
        AdmissionGate::new(&self.config).validate_job(job)
    }

    /// Whether the host can skip re-placement for `job_id`.
    pub fn is_ready(&self, job_id: &str) -> bool {
        self.ledger.is_ready(job_id)
    }

    /// Place every task of `job` onto `candidates` (`SelectNodesForJob`).
    ///
    /// A ready job returns its committed placement untouched. On failure
    /// nothing is recorded, except for a soft pass that placed some nodes:
    /// those are committed and [`PlacementError::SoftShortfall`] is returned.
    pub fn select_nodes_for_job(
        &self,
        job: &JobSpec,
        candidates: &[NodeSpec],
    ) -> PlacementResult<Placement> {
        let shape = AdmissionGate::new(&self.config)
            .validate(job)
            .map_err(|source| PlacementError::Invalid {
                job: job.id.clone(),
                source,
            })?;

        let total_blocks = shape.virtual_blocks(job.task_count());
        let prior = match self.ledger.snapshot(&job.id) {
            Some(existing) if existing.ready => {
                debug!(job = %job.id, "job already placed, reusing committed nodes");
                return Ok(existing);
            }
            Some(existing)
                if existing.shape != shape
                    || existing.blocks.len() != total_blocks
                    || existing.is_complete() =>
            {
                warn!(job = %job.id, "discarding stale placement");
                self.ledger.forget(&job.id);
                None
            }
            other => other,
        };

        let (seeded, taken): (Vec<usize>, HashSet<&str>) = match &prior {
            Some(p) => (p.blocks.iter().map(Vec::len).collect(), p.node_names().collect()),
            None => (vec![0; total_blocks], HashSet::new()),
        };
        let available: Vec<NodeSpec> = candidates
            .iter()
            .filter(|n| !taken.contains(n.name.as_str()))
            .cloned()
            .collect();

        let opts = BuildOptions::from_config(&self.config).with_required_npus(shape.node_npus);
        let topology = Topology::build(&available, &opts)?;
        let table = OrderedSuperPodTable::build(&topology);
        let chain = if prior.is_some() {
            StrategyChain::soft_continuation()
        } else {
            StrategyChain::for_job(job)
        };

        info!(
            job = %job.id,
            sp_block = shape.sp_block,
            tp_block = shape.tp_block,
            blocks = total_blocks,
            candidates = topology.len(),
            super_pods = table.len(),
            "placing job"
        );

        match chain.run(&job.id, &table, || Attempt::new(&topology, shape, seeded.clone())) {
            ChainOutcome::Placed { strategy, attempt } => {
                let degraded = attempt.is_degraded();
                let blocks = resolve(&topology, attempt);
                self.ledger
                    .record(&job.id, shape, blocks, Some(strategy), degraded)
            }
            ChainOutcome::Partial { attempt, error } => {
                if attempt.placed_nodes() > 0 {
                    let blocks = resolve(&topology, attempt);
                    self.ledger.record(&job.id, shape, blocks, None, true)?;
                }
                Err(error)
            }
            ChainOutcome::Failed(error) => Err(error),
        }
    }

    /// Reconfirm the committed node of one task (`ScoreNodesForJob`).
    pub fn score_nodes_for_job(
        &self,
        task: &TaskSpec,
        job: &JobSpec,
        scores: &mut HashMap<String, f64>,
    ) -> PlacementResult<()> {
        scorer::score_task(&self.ledger, &job.id, task, self.config.affinity_score_bonus, scores)
    }

    /// Reconfirm every pending task of one phase in a single pass.
    pub fn score_nodes_for_batch(
        &self,
        job: &JobSpec,
        pending: &[TaskSpec],
        phase: Option<&str>,
        scores: &mut HashMap<String, f64>,
    ) -> PlacementResult<usize> {
        scorer::score_batch(
            &self.ledger,
            &job.id,
            pending,
            phase,
            self.config.affinity_score_bonus,
            scores,
        )
    }

    /// Drop everything recorded for a finished job.
    pub fn forget(&self, job_id: &str) -> Option<Placement> {
        self.ledger.forget(job_id)
    }
}

/// Turn an attempt's node indices into ledger records.
fn resolve(topology: &Topology, attempt: Attempt<'_>) -> Vec<Vec<PlacedNode>> {
    attempt
        .into_picks()
        .into_iter()
        .map(|block| {
            block
                .into_iter()
                .map(|idx| {
                    let node = topology.node(idx);
                    PlacedNode {
                        name: node.name.clone(),
                        super_pod_id: node.super_pod_id,
                        rack_id: node.rack_id,
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn node(name: &str, super_pod_id: u32, rack_id: u32) -> NodeSpec {
        NodeSpec {
            name: name.to_string(),
            super_pod_id,
            rack_id,
            memory_group_id: None,
            idle_npus: 8,
            unhealthy: false,
        }
    }

    fn placed(name: &str) -> PlacedNode {
        PlacedNode {
            name: name.to_string(),
            super_pod_id: 0,
            rack_id: 0,
        }
    }

    #[test]
    fn rank_lookup_follows_block_layout() {
        let shape = BlockShape {
            sp_block: 2,
            tp_block: 1,
            node_npus: 8,
        };
        let mut p = Placement::empty("j", shape, 2);
        p.blocks[0] = vec![placed("a"), placed("b")];
        p.blocks[1] = vec![placed("c"), placed("d")];

        assert_eq!(p.node_for_rank(0).unwrap().name, "a");
        assert_eq!(p.node_for_rank(3).unwrap().name, "d");
        assert!(p.node_for_rank(4).is_none());
        assert!(p.is_complete());

        let table = p.rank_table();
        assert_eq!(table.len(), 4);
        assert_eq!(table[2].block, 1);
        assert_eq!(table[2].local_rank, 0);
        assert_eq!(table[2].node, "c");
    }

    #[test]
    fn single_node_job_lands_in_rack() {
        let engine = PlacementEngine::new(PlacementConfig::default());
        let job = JobSpec::uniform("default/a", 1, 8, 8, 8);

        let placement = engine.select_nodes_for_job(&job, &[node("n1", 0, 0)]).unwrap();
        assert_eq!(placement.strategy, Some(StrategyKind::Rack));
        assert_eq!(placement.blocks.len(), 1);
        assert_eq!(placement.blocks[0], vec![placed("n1")]);
        assert!(engine.is_ready("default/a"));
    }

    #[test]
    fn invalid_job_leaves_ledger_untouched() {
        let engine = PlacementEngine::new(PlacementConfig::default());
        let job = JobSpec::uniform("default/bad", 3, 8, 16, 8);

        let err = engine.select_nodes_for_job(&job, &[node("n1", 0, 0)]).unwrap_err();
        assert!(matches!(err, PlacementError::Invalid { .. }));
        assert!(engine.ledger().is_empty());
        assert!(!engine.validate_job(&job).pass);
    }

    #[test]
    fn zero_node_capacity_is_rejected_not_fatal() {
        let engine = PlacementEngine::new(PlacementConfig {
            node_npu_capacity: 0,
            ..PlacementConfig::default()
        });
        let job = JobSpec::uniform("default/a", 2, 8, 16, 8);

        let err = engine.select_nodes_for_job(&job, &[node("n1", 0, 0)]).unwrap_err();
        assert!(matches!(
            err,
            PlacementError::Invalid {
                source: ValidationError::NodeCapacityZero,
                ..
            }
        ));
        assert!(engine.ledger().is_empty());
    }

    #[test]
    fn duplicate_candidates_are_rejected() {
        let engine = PlacementEngine::new(PlacementConfig::default());
        let job = JobSpec::uniform("default/a", 1, 8, 8, 8);

        let err = engine
            .select_nodes_for_job(&job, &[node("n1", 0, 0), node("n1", 0, 1)])
            .unwrap_err();
        assert!(matches!(err, PlacementError::Topology(_)));
    }

    #[test]
    fn sub_node_task_accepts_partially_busy_node() {
        let engine = PlacementEngine::new(PlacementConfig::default());
        let job = JobSpec::uniform("default/small", 1, 2, 2, 2);
        let mut busy = node("busy", 0, 0);
        busy.idle_npus = 3;

        let placement = engine.select_nodes_for_job(&job, &[busy]).unwrap();
        assert_eq!(placement.blocks[0][0].name, "busy");
    }

    #[test]
    fn forget_drops_the_job() {
        let engine = PlacementEngine::new(PlacementConfig::default());
        let job = JobSpec::uniform("default/a", 1, 8, 8, 8);
        engine.select_nodes_for_job(&job, &[node("n1", 0, 0)]).unwrap();

        assert!(engine.forget("default/a").is_some());
        assert!(!engine.is_ready("default/a"));
    }
}
