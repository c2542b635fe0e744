//! Rank-pinned scoring.
//!
//! Once a job is placed, every later scheduling pass must land each task on
//! the node recorded for its rank. The host hands in a score map keyed by
//! candidate node name; the recorded node gets a bonus large enough to
//! dominate every other scoring signal.

use std::collections::HashMap;

use tracing::{debug, warn};

use podgrid_core::TaskSpec;

use crate::error::{PlacementError, PlacementResult};
use crate::ledger::PlacementLedger;
use crate::placer::Placement;

/// Add `bonus` to the node recorded for `task`'s rank.
///
/// A missing rank or a recorded node that is no longer a candidate clears
/// the job's readiness so the next pass re-places it.
pub fn score_task(
    ledger: &PlacementLedger,
    job_id: &str,
    task: &TaskSpec,
    bonus: f64,
    scores: &mut HashMap<String, f64>,
) -> PlacementResult<()> {
    let placement = ready_placement(ledger, job_id)?;
    let rank = task.virtual_rank();

    match pinned_node(&placement, job_id, rank, scores) {
        Ok(node) => {
            if let Some(score) = scores.get_mut(&node) {
                *score += bonus;
            }
            debug!(job = job_id, task = %task.name, rank, node = %node, "rank reconfirmed");
            Ok(())
        }
        Err(err) => {
            ledger.clear_ready(job_id);
            warn!(job = job_id, task = %task.name, error = %err, "placement is stale, job will be re-placed");
            Err(err)
        }
    }
}

/// Score every pending task of `phase` in one pass, all or nothing.
///
/// Scores are `bonus - rank` so simultaneously scored nodes keep rank order.
/// `phase` of `None` takes every pending task. Returns the number of tasks
/// scored.
pub fn score_batch(
    ledger: &PlacementLedger,
    job_id: &str,
    pending: &[TaskSpec],
    phase: Option<&str>,
    bonus: f64,
    scores: &mut HashMap<String, f64>,
) -> PlacementResult<usize> {
    let placement = ready_placement(ledger, job_id)?;

    let mut pinned = Vec::new();
    for task in pending
        .iter()
        .filter(|t| phase.is_none() || t.phase.as_deref() == phase)
    {
        let rank = task.virtual_rank();
        match pinned_node(&placement, job_id, rank, scores) {
            Ok(node) => pinned.push((node, rank)),
            Err(err) => {
                ledger.clear_ready(job_id);
                warn!(job = job_id, task = %task.name, error = %err, "batch scoring aborted, job will be re-placed");
                return Err(err);
            }
        }
    }

    for (node, rank) in &pinned {
        if let Some(score) = scores.get_mut(node) {
            *score += bonus - *rank as f64;
        }
    }
    debug!(job = job_id, phase = ?phase, tasks = pinned.len(), "batch reconfirmed");
    Ok(pinned.len())
}

fn ready_placement(ledger: &PlacementLedger, job_id: &str) -> PlacementResult<Placement> {
    ledger
        .snapshot(job_id)
        .filter(|p| p.ready)
        .ok_or_else(|| PlacementError::NotPlaced(job_id.to_string()))
}

fn pinned_node(
    placement: &Placement,
    job_id: &str,
    rank: usize,
    scores: &HashMap<String, f64>,
) -> PlacementResult<String> {
    let node = placement
        .node_for_rank(rank)
        .ok_or_else(|| PlacementError::RankUnrecorded {
            job: job_id.to_string(),
            rank,
        })?;
    if !scores.contains_key(&node.name) {
        return Err(PlacementError::StalePlacement {
            job: job_id.to_string(),
            rank,
            node: node.name.clone(),
        });
    }
    Ok(node.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::BlockShape;
    use crate::placer::PlacedNode;
    use crate::strategy::StrategyKind;

    const BONUS: f64 = 100_000_000.0;

    fn ledger_with(job: &str, blocks: &[&[&str]]) -> PlacementLedger {
        let ledger = PlacementLedger::new();
        let shape = BlockShape {
            sp_block: blocks[0].len(),
            tp_block: 1,
            node_npus: 8,
        };
        let blocks = blocks
            .iter()
            .map(|b| {
                b.iter()
                    .map(|n| PlacedNode {
                        name: n.to_string(),
                        super_pod_id: 0,
                        rack_id: 0,
                    })
                    .collect()
            })
            .collect();
        ledger
            .record(job, shape, blocks, Some(StrategyKind::SuperPod), false)
            .unwrap();
        ledger
    }

    fn task(index: usize, phase: Option<&str>) -> TaskSpec {
        TaskSpec {
            name: format!("t-{index}"),
            index,
            req_npu: 8,
            rank_index: None,
            phase: phase.map(str::to_string),
        }
    }

    fn candidates(names: &[&str]) -> HashMap<String, f64> {
        names.iter().map(|n| (n.to_string(), 0.0)).collect()
    }

    #[test]
    fn pinned_node_gets_bonus() {
        let ledger = ledger_with("j", &[&["a", "b"], &["c", "d"]]);
        let mut scores = candidates(&["a", "b", "c", "d", "e"]);

        score_task(&ledger, "j", &task(2, None), BONUS, &mut scores).unwrap();
        assert_eq!(scores["c"], BONUS);
        assert_eq!(scores["a"], 0.0);
    }

    #[test]
    fn rank_annotation_overrides_index() {
        let ledger = ledger_with("j", &[&["a", "b"]]);
        let mut scores = candidates(&["a", "b"]);
        let mut t = task(0, None);
        t.rank_index = Some(1);

        score_task(&ledger, "j", &t, BONUS, &mut scores).unwrap();
        assert_eq!(scores["b"], BONUS);
    }

    #[test]
    fn missing_candidate_clears_readiness() {
        let ledger = ledger_with("j", &[&["a", "b"]]);
        let mut scores = candidates(&["a"]);

        let err = score_task(&ledger, "j", &task(1, None), BONUS, &mut scores).unwrap_err();
        assert!(matches!(err, PlacementError::StalePlacement { rank: 1, .. }));
        assert!(!ledger.is_ready("j"));

        // Not ready any more, so scoring is refused outright.
        let err = score_task(&ledger, "j", &task(0, None), BONUS, &mut scores).unwrap_err();
        assert_eq!(err, PlacementError::NotPlaced("j".to_string()));
    }

    #[test]
    fn out_of_range_rank_clears_readiness() {
        let ledger = ledger_with("j", &[&["a"]]);
        let mut scores = candidates(&["a"]);

        let err = score_task(&ledger, "j", &task(5, None), BONUS, &mut scores).unwrap_err();
        assert!(matches!(err, PlacementError::RankUnrecorded { rank: 5, .. }));
        assert!(!ledger.is_ready("j"));
    }

    #[test]
    fn batch_scores_in_rank_order() {
        let ledger = ledger_with("j", &[&["a", "b"], &["c", "d"]]);
        let mut scores = candidates(&["a", "b", "c", "d"]);
        let pending = vec![
            task(0, Some("scheduler")),
            task(1, Some("worker")),
            task(2, Some("worker")),
        ];

        let scored =
            score_batch(&ledger, "j", &pending, Some("worker"), BONUS, &mut scores).unwrap();
        assert_eq!(scored, 2);
        assert_eq!(scores["a"], 0.0);
        assert_eq!(scores["b"], BONUS - 1.0);
        assert_eq!(scores["c"], BONUS - 2.0);
        assert!(scores["b"] > scores["c"]);
    }

    #[test]
    fn batch_miss_scores_nothing() {
        let ledger = ledger_with("j", &[&["a", "b"]]);
        let mut scores = candidates(&["a"]);
        let pending = vec![task(0, None), task(1, None)];

        assert!(score_batch(&ledger, "j", &pending, None, BONUS, &mut scores).is_err());
        assert_eq!(scores["a"], 0.0);
        assert!(!ledger.is_ready("j"));
    }
}
