//! Placement error types.

use thiserror::Error;

use crate::strategy::StrategyKind;

/// Result type alias for admission checks.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type alias for placement and scoring operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// Reasons the admission gate rejects a job.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("job has no tasks")]
    NoTasks,

    #[error("configured node NPU capacity is zero")]
    NodeCapacityZero,

    #[error("sp-block ({0}) must be positive")]
    SpBlockNotPositive(u32),

    #[error("sp-block ({sp_block_npu}) is not a multiple of node NPU capacity ({node_npu})")]
    SpBlockNotNodeMultiple { sp_block_npu: u32, node_npu: u32 },

    #[error("task count ({tasks}) is not a multiple of sp-block node count ({sp_block})")]
    TasksNotSpBlockMultiple { tasks: usize, sp_block: usize },

    #[error("super-pod size ({size}) must be within [1, {max}]")]
    SuperPodSizeOutOfRange { size: u32, max: u32 },

    #[error("sp-block node count ({sp_block}) exceeds super-pod size ({size})")]
    SpBlockExceedsSuperPod { sp_block: usize, size: u32 },

    #[error("tp-block ({tp_block_npu}) must be within [1, {max}]")]
    TpBlockOutOfRange { tp_block_npu: u32, max: u32 },

    #[error("tp-block ({0}) is not a power of two")]
    TpBlockNotPowerOfTwo(u32),

    #[error("tp-block node count ({tp_block}) exceeds sp-block node count ({sp_block})")]
    TpBlockExceedsSpBlock { tp_block: usize, sp_block: usize },

    #[error("task count ({tasks}) is not a multiple of tp-block node count ({tp_block})")]
    TasksNotTpBlockMultiple { tasks: usize, tp_block: usize },

    #[error("sp-block node count ({sp_block}) is not a multiple of tp-block node count ({tp_block})")]
    SpBlockNotTpBlockMultiple { sp_block: usize, tp_block: usize },

    #[error("single-task job requests {requested} NPUs, expected sp-block ({sp_block_npu}) within [1, {node_npu}]")]
    SingleTaskRequest {
        requested: u32,
        sp_block_npu: u32,
        node_npu: u32,
    },

    #[error("job requests {total} NPUs, not a multiple of sp-block ({sp_block_npu}) and tp-block ({tp_block_npu})")]
    TotalNotBlockMultiple {
        total: u64,
        sp_block_npu: u32,
        tp_block_npu: u32,
    },

    #[error("task {task} requests {requested} NPUs, multi-task jobs must request whole nodes ({node_npu})")]
    PartialNodeTask {
        task: String,
        requested: u32,
        node_npu: u32,
    },

    #[error("memory-group job requests {total} NPUs, more than the {max} allowed")]
    MemorySceneTooLarge { total: u64, max: u32 },
}

impl ValidationError {
    /// Short machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoTasks => "JobHasNoTasks",
            Self::NodeCapacityZero => "NodeCapacityInvalid",
            Self::SpBlockNotPositive(_) | Self::SpBlockNotNodeMultiple { .. } => "SpBlockInvalid",
            Self::TasksNotSpBlockMultiple { .. } => "TaskCountInvalid",
            Self::SuperPodSizeOutOfRange { .. } | Self::SpBlockExceedsSuperPod { .. } => {
                "SuperPodSizeInvalid"
            }
            Self::TpBlockOutOfRange { .. } | Self::TpBlockNotPowerOfTwo(_) => "TpBlockInvalid",
            Self::TpBlockExceedsSpBlock { .. }
            | Self::TasksNotTpBlockMultiple { .. }
            | Self::SpBlockNotTpBlockMultiple { .. } => "TpBlockMismatch",
            Self::SingleTaskRequest { .. }
            | Self::TotalNotBlockMultiple { .. }
            | Self::PartialNodeTask { .. } => "NpuRequestInvalid",
            Self::MemorySceneTooLarge { .. } => "MemorySceneTooLarge",
        }
    }
}

/// Coarse classification the host uses to pick a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected by admission; retrying cannot help.
    ParameterInvalid,
    /// No cluster shape could ever satisfy the request.
    TopologyImpossible,
    /// The current cluster state is too full; retry next cycle.
    CapacityExhausted,
    /// A committed node disappeared; the job will be re-placed.
    StalePlacement,
}

/// Errors that can occur during placement or scoring.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlacementError {
    #[error("job {job} rejected: {source}")]
    Invalid {
        job: String,
        #[source]
        source: ValidationError,
    },

    #[error("{strategy} cannot place job {job}: no rack can host a single tp-block")]
    TopologyImpossible { job: String, strategy: StrategyKind },

    #[error("{strategy} failed for job {job}: {unplaced} of {total} virtual blocks unplaced")]
    StrategyExhausted {
        job: String,
        strategy: StrategyKind,
        unplaced: usize,
        total: usize,
    },

    #[error("scheduling failed for job {job}: {last}")]
    SchedulingFailed { job: String, last: Box<PlacementError> },

    #[error("soft placement of job {job} incomplete: placed {placed} nodes, {shortfall} short")]
    SoftShortfall {
        job: String,
        placed: usize,
        shortfall: usize,
    },

    #[error("job {0} has no committed placement")]
    NotPlaced(String),

    #[error("rank {rank} of job {job} has no recorded node")]
    RankUnrecorded { job: String, rank: usize },

    #[error("node {node} recorded for rank {rank} of job {job} is no longer a candidate")]
    StalePlacement {
        job: String,
        rank: usize,
        node: String,
    },

    #[error("virtual block {block} of job {job} is already filled")]
    LedgerConflict { job: String, block: usize },

    #[error("topology error: {0}")]
    Topology(#[from] podgrid_topology::TopologyError),
}

impl PlacementError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Invalid { .. } | Self::Topology(_) => ErrorClass::ParameterInvalid,
            Self::TopologyImpossible { .. } => ErrorClass::TopologyImpossible,
            Self::StrategyExhausted { .. }
            | Self::SchedulingFailed { .. }
            | Self::SoftShortfall { .. }
            | Self::NotPlaced(_)
            | Self::LedgerConflict { .. } => ErrorClass::CapacityExhausted,
            Self::RankUnrecorded { .. } | Self::StalePlacement { .. } => {
                ErrorClass::StalePlacement
            }
        }
    }

    /// Whether the host should try the job again on a later cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::CapacityExhausted | ErrorClass::StalePlacement
        )
    }
}
