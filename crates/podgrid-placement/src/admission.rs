//! Admission gate: validates a job's affinity parameters.
//!
//! Derives the two placement units every strategy works in:
//! - **`sp_block`**: nodes that must share one super-pod
//! - **`tp_block`**: nodes that must share one rack inside an sp-block
//!
//! The gate never touches the topology or the ledger; a rejected job
//! leaves no trace.

use podgrid_core::{JobSpec, PlacementConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ValidationError, ValidationResult};

/// Placement granularity derived for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockShape {
    /// Nodes per sp-block (one virtual block).
    pub sp_block: usize,
    /// Nodes per tp-block.
    pub tp_block: usize,
    /// NPUs each task occupies on its node.
    pub node_npus: u32,
}

impl BlockShape {
    /// Number of virtual blocks a job of `task_count` tasks is split into.
    pub fn virtual_blocks(&self, task_count: usize) -> usize {
        task_count / self.sp_block
    }

    /// tp-blocks per sp-block.
    pub fn slices_per_block(&self) -> usize {
        self.sp_block / self.tp_block
    }
}

/// Admission verdict in the shape the host scheduler expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateResult {
    pub pass: bool,
    pub reason: String,
    pub message: String,
}

impl ValidateResult {
    pub fn passed() -> Self {
        Self {
            pass: true,
            reason: String::new(),
            message: String::new(),
        }
    }

    pub fn rejected(err: &ValidationError) -> Self {
        Self {
            pass: false,
            reason: err.reason().to_string(),
            message: err.to_string(),
        }
    }
}

/// Validates jobs against the cluster configuration.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionGate<'a> {
    config: &'a PlacementConfig,
}

impl<'a> AdmissionGate<'a> {
    pub fn new(config: &'a PlacementConfig) -> Self {
        Self { config }
    }

    /// Run every check in order and derive the job's [`BlockShape`].
    pub fn validate(&self, job: &JobSpec) -> ValidationResult<BlockShape> {
        if job.tasks.is_empty() {
            return Err(ValidationError::NoTasks);
        }
        if self.config.node_npu_capacity == 0 {
            return Err(ValidationError::NodeCapacityZero);
        }
        let sp_block = self.check_sp_block(job)?;
        self.check_super_pod_size(sp_block)?;
        let tp_block = self.check_tp_block(job, sp_block)?;
        let node_npus = self.check_npu_request(job)?;
        self.check_memory_scene(job)?;

        debug!(job = %job.id, sp_block, tp_block, "job admitted");
        Ok(BlockShape {
            sp_block,
            tp_block,
            node_npus,
        })
    }

    /// [`Self::validate`] folded into a [`ValidateResult`].
    pub fn validate_job(&self, job: &JobSpec) -> ValidateResult {
        match self.validate(job) {
            Ok(_) => ValidateResult::passed(),
            Err(e) => {
                debug!(job = %job.id, reason = e.reason(), error = %e, "job rejected");
                ValidateResult::rejected(&e)
            }
        }
    }

    fn check_sp_block(&self, job: &JobSpec) -> ValidationResult<usize> {
        let sp_npu = job.sp_block_npu_num;
        let node_npu = self.config.node_npu_capacity;
        if sp_npu == 0 {
            return Err(ValidationError::SpBlockNotPositive(sp_npu));
        }
        let sp_block = if sp_npu < node_npu {
            1
        } else {
            if sp_npu % node_npu != 0 {
                return Err(ValidationError::SpBlockNotNodeMultiple {
                    sp_block_npu: sp_npu,
                    node_npu,
                });
            }
            (sp_npu / node_npu) as usize
        };

        let tasks = job.task_count();
        if tasks % sp_block != 0 {
            return Err(ValidationError::TasksNotSpBlockMultiple { tasks, sp_block });
        }
        Ok(sp_block)
    }

    fn check_super_pod_size(&self, sp_block: usize) -> ValidationResult<()> {
        let size = self.config.super_pod_size;
        let max = self.config.max_super_pod_nodes();
        if size == 0 || size > max {
            return Err(ValidationError::SuperPodSizeOutOfRange { size, max });
        }
        if sp_block > size as usize {
            return Err(ValidationError::SpBlockExceedsSuperPod { sp_block, size });
        }
        Ok(())
    }

    fn check_tp_block(&self, job: &JobSpec, sp_block: usize) -> ValidationResult<usize> {
        let tp_npu = job.tp_block_npu_num;
        let max = self.config.rack_npu_capacity();
        if tp_npu == 0 || tp_npu > max {
            return Err(ValidationError::TpBlockOutOfRange {
                tp_block_npu: tp_npu,
                max,
            });
        }
        if !tp_npu.is_power_of_two() {
            return Err(ValidationError::TpBlockNotPowerOfTwo(tp_npu));
        }

        let tp_block = tp_npu.div_ceil(self.config.node_npu_capacity) as usize;
        if tp_block > sp_block {
            return Err(ValidationError::TpBlockExceedsSpBlock { tp_block, sp_block });
        }
        let tasks = job.task_count();
        if tasks % tp_block != 0 {
            return Err(ValidationError::TasksNotTpBlockMultiple { tasks, tp_block });
        }
        if sp_block % tp_block != 0 {
            return Err(ValidationError::SpBlockNotTpBlockMultiple { sp_block, tp_block });
        }
        Ok(tp_block)
    }

    /// Returns the NPUs each task needs free on its node.
    fn check_npu_request(&self, job: &JobSpec) -> ValidationResult<u32> {
        let node_npu = self.config.node_npu_capacity;

        if let [task] = job.tasks.as_slice() {
            let requested = task.req_npu;
            if requested != job.sp_block_npu_num || requested == 0 || requested > node_npu {
                return Err(ValidationError::SingleTaskRequest {
                    requested,
                    sp_block_npu: job.sp_block_npu_num,
                    node_npu,
                });
            }
            return Ok(requested);
        }

        let total = job.total_npu();
        if total % u64::from(job.sp_block_npu_num) != 0
            || total % u64::from(job.tp_block_npu_num) != 0
        {
            return Err(ValidationError::TotalNotBlockMultiple {
                total,
                sp_block_npu: job.sp_block_npu_num,
                tp_block_npu: job.tp_block_npu_num,
            });
        }
        if let Some(task) = job.tasks.iter().find(|t| t.req_npu != node_npu) {
            return Err(ValidationError::PartialNodeTask {
                task: task.name.clone(),
                requested: task.req_npu,
                node_npu,
            });
        }
        Ok(node_npu)
    }

    fn check_memory_scene(&self, job: &JobSpec) -> ValidationResult<()> {
        let max = self.config.max_npu_in_memory_scene;
        let total = job.total_npu();
        if job.memory_group_scene && total > u64::from(max) {
            return Err(ValidationError::MemorySceneTooLarge { total, max });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_with(config: &PlacementConfig) -> AdmissionGate<'_> {
        AdmissionGate::new(config)
    }

    fn job(tasks: usize, sp: u32, tp: u32) -> JobSpec {
        JobSpec::uniform("default/train", tasks, 8, sp, tp)
    }

    #[test]
    fn derives_blocks_for_whole_node_job() {
        let config = PlacementConfig::default();
        let shape = gate_with(&config).validate(&job(8, 32, 16)).unwrap();

        assert_eq!(shape.sp_block, 4);
        assert_eq!(shape.tp_block, 2);
        assert_eq!(shape.node_npus, 8);
        assert_eq!(shape.virtual_blocks(8), 2);
        assert_eq!(shape.slices_per_block(), 2);
    }

    #[test]
    fn sub_node_single_task_uses_one_node() {
        let config = PlacementConfig::default();
        let mut j = JobSpec::uniform("default/small", 1, 4, 4, 4);
        j.tasks[0].req_npu = 4;

        let shape = gate_with(&config).validate(&j).unwrap();
        assert_eq!(shape.sp_block, 1);
        assert_eq!(shape.tp_block, 1);
        assert_eq!(shape.node_npus, 4);
    }

    #[test]
    fn rejects_empty_job() {
        let config = PlacementConfig::default();
        let err = gate_with(&config).validate(&job(0, 8, 8)).unwrap_err();
        assert_eq!(err, ValidationError::NoTasks);
    }

    #[test]
    fn rejects_zero_node_capacity() {
        let config = PlacementConfig {
            node_npu_capacity: 0,
            ..PlacementConfig::default()
        };
        let gate = gate_with(&config);

        assert_eq!(
            gate.validate(&job(2, 16, 8)).unwrap_err(),
            ValidationError::NodeCapacityZero
        );
        assert_eq!(gate.validate_job(&job(2, 16, 8)).reason, "NodeCapacityInvalid");
    }

    #[test]
    fn rejects_zero_sp_block() {
        let config = PlacementConfig::default();
        let err = gate_with(&config).validate(&job(2, 0, 8)).unwrap_err();
        assert_eq!(err, ValidationError::SpBlockNotPositive(0));
        assert_eq!(err.reason(), "SpBlockInvalid");
    }

    #[test]
    fn rejects_sp_block_not_node_multiple() {
        let config = PlacementConfig::default();
        let err = gate_with(&config).validate(&job(2, 12, 8)).unwrap_err();
        assert!(matches!(err, ValidationError::SpBlockNotNodeMultiple { .. }));
    }

    #[test]
    fn rejects_task_count_not_sp_multiple() {
        let config = PlacementConfig::default();
        let err = gate_with(&config).validate(&job(3, 16, 8)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TasksNotSpBlockMultiple {
                tasks: 3,
                sp_block: 2
            }
        );
    }

    #[test]
    fn rejects_bad_super_pod_size() {
        let config = PlacementConfig {
            super_pod_size: 0,
            ..Default::default()
        };
        let err = gate_with(&config).validate(&job(2, 16, 8)).unwrap_err();
        assert!(matches!(err, ValidationError::SuperPodSizeOutOfRange { .. }));

        let config = PlacementConfig {
            super_pod_size: 2048,
            ..Default::default()
        };
        let err = gate_with(&config).validate(&job(2, 16, 8)).unwrap_err();
        assert!(matches!(err, ValidationError::SuperPodSizeOutOfRange { size: 2048, max: 1024 }));
    }

    #[test]
    fn rejects_sp_block_larger_than_super_pod() {
        let config = PlacementConfig {
            super_pod_size: 2,
            ..Default::default()
        };
        let err = gate_with(&config).validate(&job(4, 32, 8)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::SpBlockExceedsSuperPod {
                sp_block: 4,
                size: 2
            }
        );
    }

    #[test]
    fn rejects_tp_block_out_of_range() {
        let config = PlacementConfig::default();
        let err = gate_with(&config).validate(&job(16, 128, 128)).unwrap_err();
        assert!(matches!(err, ValidationError::TpBlockOutOfRange { max: 64, .. }));

        let err = gate_with(&config).validate(&job(2, 16, 0)).unwrap_err();
        assert!(matches!(err, ValidationError::TpBlockOutOfRange { .. }));
    }

    #[test]
    fn non_power_of_two_tp_rejected_for_any_sp() {
        let config = PlacementConfig::default();
        let gate = gate_with(&config);
        for sp in [1, 4, 8, 16, 24, 64, 128, 1000] {
            for tp in [3, 6, 12, 24, 48] {
                let result = gate.validate_job(&job(48, sp, tp));
                assert!(!result.pass, "sp={sp} tp={tp} should be rejected");
            }
            // Whatever fails first, a bad tp never passes.
            let err = gate.validate(&job(48, sp, 24));
            assert!(err.is_err());
        }
        let err = gate.validate(&job(48, 48, 24)).unwrap_err();
        assert_eq!(err, ValidationError::TpBlockNotPowerOfTwo(24));
        assert_eq!(err.reason(), "TpBlockInvalid");
    }

    #[test]
    fn rejects_tp_larger_than_sp() {
        let config = PlacementConfig::default();
        let err = gate_with(&config).validate(&job(4, 16, 32)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TpBlockExceedsSpBlock {
                tp_block: 4,
                sp_block: 2
            }
        );
    }

    #[test]
    fn rejects_sp_not_tp_multiple() {
        let config = PlacementConfig::default();
        // sp-block 6 nodes, tp-block 4 nodes, 12 tasks.
        let err = gate_with(&config).validate(&job(12, 48, 32)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::SpBlockNotTpBlockMultiple {
                sp_block: 6,
                tp_block: 4
            }
        );
    }

    #[test]
    fn rejects_tasks_not_tp_multiple() {
        let config = PlacementConfig::default();
        // sp-block 6 nodes, tp-block 4 nodes, 6 tasks.
        let err = gate_with(&config).validate(&job(6, 48, 32)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TasksNotTpBlockMultiple {
                tasks: 6,
                tp_block: 4
            }
        );
    }

    #[test]
    fn single_task_must_match_sp_block() {
        let config = PlacementConfig::default();
        let mut j = JobSpec::uniform("default/one", 1, 8, 4, 4);
        j.tasks[0].req_npu = 2;

        let err = gate_with(&config).validate(&j).unwrap_err();
        assert!(matches!(err, ValidationError::SingleTaskRequest { requested: 2, .. }));
    }

    #[test]
    fn multi_task_requires_whole_nodes() {
        let config = PlacementConfig::default();
        let mut j = job(2, 8, 8);
        j.tasks[1].req_npu = 4;
        j.tasks[0].req_npu = 12;

        let err = gate_with(&config).validate(&j).unwrap_err();
        assert!(matches!(err, ValidationError::PartialNodeTask { requested: 12, .. }));
    }

    #[test]
    fn multi_task_total_must_divide_into_blocks() {
        let config = PlacementConfig::default();
        let mut j = job(2, 8, 8);
        j.tasks[1].req_npu = 4;

        let err = gate_with(&config).validate(&j).unwrap_err();
        assert!(matches!(err, ValidationError::TotalNotBlockMultiple { total: 12, .. }));
    }

    #[test]
    fn memory_scene_caps_total() {
        let config = PlacementConfig::default();
        let mut j = job(136, 64, 64);
        j.memory_group_scene = true;

        let err = gate_with(&config).validate(&j).unwrap_err();
        assert_eq!(err, ValidationError::MemorySceneTooLarge { total: 1088, max: 1024 });

        j.memory_group_scene = false;
        assert!(gate_with(&config).validate(&j).is_ok());
    }

    #[test]
    fn rejection_result_carries_reason_and_message() {
        let config = PlacementConfig::default();
        let result = gate_with(&config).validate_job(&job(3, 16, 8));

        assert!(!result.pass);
        assert_eq!(result.reason, "TaskCountInvalid");
        assert!(result.message.contains("task count (3)"));
        assert!(gate_with(&config).validate_job(&job(4, 16, 8)).pass);
    }

    #[test]
    fn admitted_shapes_are_consistent() {
        let config = PlacementConfig::default();
        let gate = gate_with(&config);
        for tasks in [1usize, 2, 4, 6, 8, 12, 16, 32] {
            for sp in (0..=16).map(|k| k * 8) {
                for tp in [1, 2, 4, 8, 16, 32, 64] {
                    let j = job(tasks, sp, tp);
                    if let Ok(shape) = gate.validate(&j) {
                        assert!(shape.sp_block > 0 && shape.tp_block > 0);
                        assert!(shape.tp_block <= shape.sp_block);
                        assert_eq!(tasks % shape.sp_block, 0);
                        assert_eq!(shape.sp_block % shape.tp_block, 0);
                    }
                }
            }
        }
    }
}
