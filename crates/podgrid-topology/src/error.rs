//! Error types for topology construction.

use thiserror::Error;

/// Result type alias for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors raised while turning host input into a [`crate::Topology`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("node {node} is missing annotation {key}")]
    MissingAnnotation { node: String, key: String },

    #[error("node {node} has invalid value {value:?} for annotation {key}")]
    InvalidAnnotation {
        node: String,
        key: String,
        value: String,
    },

    #[error("node {0} appears more than once in the candidate list")]
    DuplicateNode(String),
}
