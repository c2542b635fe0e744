use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use podgrid_placement::{Placement, PlacementEngine};
use tracing::info;

use super::{EngineArgs, load_cluster, load_job};

pub fn place(cluster: &Path, job: &Path, engine: &EngineArgs, format: &str) -> Result<()> {
    let config = engine.load_config()?;
    let snapshot = load_cluster(cluster)?;
    let job = load_job(job)?;
    let engine = PlacementEngine::new(config);

    let outcome = engine.select_nodes_for_job(&job, &snapshot.nodes);
    // A soft shortfall still leaves a partial placement worth showing.
    let shown = match &outcome {
        Ok(placement) => Some(placement.clone()),
        Err(_) => engine.ledger().snapshot(&job.id),
    };
    if let Some(placement) = &shown {
        match format {
            "json" => println!("{}", to_json(placement)?),
            _ => print!("{}", render(placement)),
        }
    }

    let placement = outcome.with_context(|| format!("placing job {}", job.id))?;
    info!(job = %job.id, nodes = placement.placed_nodes(), "placement complete");
    Ok(())
}

pub fn to_json(placement: &Placement) -> Result<String> {
    let mut report = serde_json::Map::new();
    report.insert("placement".to_string(), serde_json::to_value(placement)?);
    report.insert("ranks".to_string(), serde_json::to_value(placement.rank_table())?);
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Human-readable rank table.
pub fn render(placement: &Placement) -> String {
    let mut out = String::new();
    let strategy = placement
        .strategy
        .map(|s| s.to_string())
        .unwrap_or_else(|| "soft pass (incomplete)".to_string());
    let _ = writeln!(
        out,
        "job {} placed by {}{}{}",
        placement.job_id,
        strategy,
        if placement.ready { ", ready" } else { "" },
        if placement.degraded { ", degraded" } else { "" },
    );
    let _ = writeln!(
        out,
        "{:>5}  {:>5}  {:>5}  {:>9}  {:>5}  node",
        "rank", "block", "local", "super-pod", "rack"
    );
    for row in placement.rank_table() {
        let _ = writeln!(
            out,
            "{:>5}  {:>5}  {:>5}  {:>9}  {:>5}  {}",
            row.rank, row.block, row.local_rank, row.super_pod_id, row.rack_id, row.node
        );
    }
    out
}
