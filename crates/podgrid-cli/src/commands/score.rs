use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use podgrid_core::{ClusterSnapshot, JobSpec};
use podgrid_placement::PlacementEngine;

use super::{EngineArgs, load_cluster, load_job};

pub fn score(cluster: &Path, job: &Path, engine: &EngineArgs, task_index: usize) -> Result<()> {
    let engine = PlacementEngine::new(engine.load_config()?);
    let snapshot = load_cluster(cluster)?;
    let job = load_job(job)?;

    let (node, score) = pin(&engine, &snapshot, &job, task_index)?;
    println!("✓ task {task_index} of {} pinned to {node} (score {score})", job.id);
    Ok(())
}

/// Place `job`, then score one task against every node of the snapshot.
///
/// Returns the highest-scoring node, which is the one recorded for the
/// task's rank.
fn pin(
    engine: &PlacementEngine,
    snapshot: &ClusterSnapshot,
    job: &JobSpec,
    task_index: usize,
) -> Result<(String, f64)> {
    engine
        .select_nodes_for_job(job, &snapshot.nodes)
        .with_context(|| format!("placing job {}", job.id))?;
    let task = job
        .tasks
        .iter()
        .find(|t| t.index == task_index)
        .with_context(|| format!("job {} has no task with index {task_index}", job.id))?;

    let mut scores: HashMap<String, f64> = snapshot
        .nodes
        .iter()
        .map(|n| (n.name.clone(), 0.0))
        .collect();
    engine
        .score_nodes_for_job(task, job, &mut scores)
        .with_context(|| format!("scoring task {}", task.name))?;

    scores
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .context("cluster snapshot has no nodes")
}
