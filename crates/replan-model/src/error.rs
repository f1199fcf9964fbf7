//! Error types for the cluster model.

use replan_core::{NodeId, VmId};
use thiserror::Error;

/// Result type alias for model mutations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised when a mutation would leave the model inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("node {0} is not online")]
    NodeNotOnline(NodeId),

    #[error("node {node} still hosts {count} VM(s)")]
    NodeHostsVms { node: NodeId, count: usize },

    #[error("unknown VM: {0}")]
    UnknownVm(VmId),

    #[error("VM already known: {0}")]
    VmExists(VmId),

    #[error("unknown resource view: {0}")]
    UnknownResource(String),
}
