//! Host-facing input types.
//!
//! These mirror what the batch scheduler knows about the cluster and the
//! job at the start of a scheduling pass. All of them are plain data and
//! serialize to/from JSON so offline snapshots can be replayed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Unique identifier for a job (namespace-scoped, e.g. `default/llm-pretrain`).
pub type JobId = String;

/// Name of a compute node as known to the host scheduler.
pub type NodeName = String;

// ── Nodes ─────────────────────────────────────────────────────────

/// A candidate compute node and its topology annotations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSpec {
    pub name: NodeName,
    pub super_pod_id: u32,
    /// Rack identifier, unique within the owning super-pod.
    pub rack_id: u32,
    /// Explicit memory-group annotation. Derived from `rack_id` when absent.
    #[serde(default)]
    pub memory_group_id: Option<u32>,
    /// Healthy NPUs currently free on the node.
    pub idle_npus: u32,
    /// Node-level fault flag reported by the health collector.
    #[serde(default)]
    pub unhealthy: bool,
}

/// A full set of candidate nodes captured at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub nodes: Vec<NodeSpec>,
}

impl ClusterSnapshot {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        read_json(path)
    }
}

// ── Jobs ──────────────────────────────────────────────────────────

/// One gang-scheduled task of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    /// Ordinal position of the task within its job.
    pub index: usize,
    /// NPUs requested by this task.
    pub req_npu: u32,
    /// Explicit rank annotation, overriding `index` when present.
    #[serde(default)]
    pub rank_index: Option<usize>,
    /// Scheduling phase tag (e.g. `scheduler`, `worker`).
    #[serde(default)]
    pub phase: Option<String>,
}

impl TaskSpec {
    /// Rank used to locate the task's node inside a placement.
    pub fn virtual_rank(&self) -> usize {
        self.rank_index.unwrap_or(self.index)
    }
}

/// A distributed training job with super-pod affinity parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSpec {
    pub id: JobId,
    pub tasks: Vec<TaskSpec>,
    /// NPUs that must share one super-pod (`sp-block`).
    pub sp_block_npu_num: u32,
    /// NPUs that must share one rack (`tp-block`).
    pub tp_block_npu_num: u32,
    /// Job tolerates degraded locality to get scheduled.
    #[serde(default)]
    pub soft_affinity: bool,
    /// Job runs inside a memory-sharing group.
    #[serde(default)]
    pub memory_group_scene: bool,
}

impl JobSpec {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        read_json(path)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Sum of NPUs requested across all tasks.
    pub fn total_npu(&self) -> u64 {
        self.tasks.iter().map(|t| u64::from(t.req_npu)).sum()
    }

    /// Build a job of `count` identical whole-node tasks.
    pub fn uniform(id: &str, count: usize, npu_per_task: u32, sp_npu: u32, tp_npu: u32) -> Self {
        let tasks = (0..count)
            .map(|index| TaskSpec {
                name: format!("{id}-worker-{index}"),
                index,
                req_npu: npu_per_task,
                rank_index: None,
                phase: None,
            })
            .collect();
        Self {
            id: id.to_string(),
            tasks,
            sp_block_npu_num: sp_npu,
            tp_block_npu_num: tp_npu,
            soft_affinity: false,
            memory_group_scene: false,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
