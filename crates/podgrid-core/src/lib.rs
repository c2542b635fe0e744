//! podgrid-core: shared types and configuration for the podgrid
//! placement engine.
//!
//! Everything here is what the host scheduler hands to the engine:
//! candidate nodes with their topology annotations, jobs with their
//! affinity parameters, and the cluster-wide [`PlacementConfig`].

pub mod config;
pub mod error;
pub mod types;

pub use config::PlacementConfig;
pub use error::{ConfigError, ConfigResult};
pub use types::*;
