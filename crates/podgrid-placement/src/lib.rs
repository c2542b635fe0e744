//! podgrid-placement: super-pod affinity placement for gang-scheduled jobs.
//!
//! The engine decides which nodes every task of a distributed training job
//! lands on, keeping tensor-parallel groups inside a rack and
//! sequence-parallel groups inside a super-pod whenever the cluster allows.
//!
//! # Components
//!
//! - **`admission`**: Job validation and block-shape derivation
//! - **`strategy`**: Rack → memory group → super-pod → multi-super-pod chain
//! - **`ledger`**: Committed placements shared across scheduling cycles
//! - **`scorer`**: Rank-pinned scoring against the ledger
//! - **`placer`**: `PlacementEngine`, the host-facing entry point

pub mod admission;
mod attempt;
pub mod error;
pub mod ledger;
pub mod placer;
pub mod scorer;
pub mod strategy;

pub use admission::{AdmissionGate, BlockShape, ValidateResult};
pub use error::{ErrorClass, PlacementError, PlacementResult, ValidationError, ValidationResult};
pub use ledger::PlacementLedger;
pub use placer::{PlacedNode, Placement, PlacementEngine, RankAssignment};
pub use scorer::{score_batch, score_task};
pub use strategy::{Strategy, StrategyChain, StrategyKind};
