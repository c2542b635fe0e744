pub mod place;
pub mod score;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use podgrid_core::{ClusterSnapshot, JobSpec, PlacementConfig};

/// Flags shared by every command that builds an engine.
#[derive(Debug, Clone, Default, Args)]
pub struct EngineArgs {
    /// Placement config (podgrid.toml). Defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the configured super-pod size, in nodes
    #[arg(long)]
    pub super_pod_size: Option<u32>,
}

impl EngineArgs {
    pub fn load_config(&self) -> Result<PlacementConfig> {
        let mut config = match &self.config {
            Some(path) => PlacementConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PlacementConfig::default(),
        };
        if let Some(size) = self.super_pod_size {
            config.super_pod_size = size;
        }
        Ok(config)
    }
}

pub fn load_job(path: &Path) -> Result<JobSpec> {
    JobSpec::from_file(path).with_context(|| format!("loading job {}", path.display()))
}

pub fn load_cluster(path: &Path) -> Result<ClusterSnapshot> {
    ClusterSnapshot::from_file(path)
        .with_context(|| format!("loading cluster snapshot {}", path.display()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::{Path, PathBuf};

    /// Write a cluster snapshot with `racks` as `(super_pod_id, rack_id, nodes)`.
    pub fn write_cluster(dir: &Path, racks: &[(u32, u32, usize)]) -> PathBuf {
        let nodes: Vec<String> = racks
            .iter()
            .flat_map(|&(sp, rack, count)| {
                (0..count).map(move |i| {
                    format!(
                        r#"{{"name":"sp{sp}-r{rack}-n{i}","super_pod_id":{sp},"rack_id":{rack},"idle_npus":8}}"#
                    )
                })
            })
            .collect();
        let path = dir.join("cluster.json");
        std::fs::write(&path, format!(r#"{{"nodes":[{}]}}"#, nodes.join(","))).unwrap();
        path
    }

    /// Write a job of `tasks` whole-node tasks.
    pub fn write_job(dir: &Path, id: &str, tasks: usize, sp: u32, tp: u32, soft: bool) -> PathBuf {
        let tasks: Vec<String> = (0..tasks)
            .map(|i| format!(r#"{{"name":"{id}-worker-{i}","index":{i},"req_npu":8}}"#))
            .collect();
        let path = dir.join("job.json");
        std::fs::write(
            &path,
            format!(
                r#"{{"id":"{id}","tasks":[{}],"sp_block_npu_num":{sp},"tp_block_npu_num":{tp},"soft_affinity":{soft}}}"#,
                tasks.join(",")
            ),
        )
        .unwrap();
        path
    }
}
