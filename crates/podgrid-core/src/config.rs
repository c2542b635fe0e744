//! podgrid.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Cluster-wide constants the placement engine works against.
///
/// Every field has a default, so an empty file (or no file at all) yields
/// the stock hardware profile: 8-NPU nodes, 8-node racks, 16-rack memory
/// groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlacementConfig {
    /// NPUs on one compute node. Every multi-task job consumes whole nodes.
    pub node_npu_capacity: u32,
    /// Compute nodes in one rack.
    pub rack_node_count: u32,
    /// Nodes per super-pod as configured for the cluster.
    pub super_pod_size: u32,
    /// Hard upper bound on the NPU count of a single super-pod.
    pub max_super_pod_npu: u32,
    /// Racks spanned by one memory-sharing group.
    pub memory_group_rack_span: u32,
    /// Largest NPU request accepted for memory-group jobs.
    pub max_npu_in_memory_scene: u32,
    /// Score added to a previously committed node when re-scoring.
    pub affinity_score_bonus: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            node_npu_capacity: 8,
            rack_node_count: 8,
            super_pod_size: 128,
            max_super_pod_npu: 8192,
            memory_group_rack_span: 16,
            max_npu_in_memory_scene: 1024,
            affinity_score_bonus: 100_000_000.0,
        }
    }
}

impl PlacementConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: PlacementConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// NPUs one rack can hold (`RackNodeCapacityNPU`).
    pub fn rack_npu_capacity(&self) -> u32 {
        self.rack_node_count.saturating_mul(self.node_npu_capacity)
    }

    /// Upper bound on `super_pod_size`, in nodes.
    pub fn max_super_pod_nodes(&self) -> u32 {
        self.max_super_pod_npu / self.node_npu_capacity.max(1)
    }

    /// Reject values the engine cannot work with.
    ///
    /// The `super_pod_size` range is checked per job by the admission gate.
    pub fn validate(&self) -> ConfigResult<()> {
        let non_zero = [
            ("node_npu_capacity", self.node_npu_capacity),
            ("rack_node_count", self.rack_node_count),
            ("max_super_pod_npu", self.max_super_pod_npu),
            ("memory_group_rack_span", self.memory_group_rack_span),
            ("max_npu_in_memory_scene", self.max_npu_in_memory_scene),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be positive")));
            }
        }
        if !(self.affinity_score_bonus.is_finite() && self.affinity_score_bonus > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "affinity_score_bonus must be a positive number, got {}",
                self.affinity_score_bonus
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_hardware() {
        let config = PlacementConfig::default();
        assert_eq!(config.node_npu_capacity, 8);
        assert_eq!(config.rack_npu_capacity(), 64);
        assert_eq!(config.max_super_pod_nodes(), 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_empty_uses_defaults() {
        let config = PlacementConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlacementConfig::default());
    }

    #[test]
    fn parse_partial_overrides() {
        let config = PlacementConfig::from_toml_str(
            r#"
super_pod_size = 48
memory_group_rack_span = 4
"#,
        )
        .unwrap();
        assert_eq!(config.super_pod_size, 48);
        assert_eq!(config.memory_group_rack_span, 4);
        assert_eq!(config.node_npu_capacity, 8);
    }

    #[test]
    fn rejects_zero_node_capacity() {
        let err = PlacementConfig::from_toml_str("node_npu_capacity = 0").unwrap_err();
        assert!(err.to_string().contains("node_npu_capacity"));
    }

    #[test]
    fn rejects_negative_bonus() {
        let err = PlacementConfig::from_toml_str("affinity_score_bonus = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn render_then_parse_keeps_values() {
        let config = PlacementConfig {
            super_pod_size: 32,
            ..Default::default()
        };
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("super_pod_size = 32"));
        assert_eq!(PlacementConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn from_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = PlacementConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("podgrid.toml");
        std::fs::write(&path, "rack_node_count = 4\n").unwrap();

        let config = PlacementConfig::from_file(&path).unwrap();
        assert_eq!(config.rack_npu_capacity(), 32);
    }
}
