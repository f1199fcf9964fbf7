//! Plan error types.

use replan_core::{Moment, NodeId, VmId};
use replan_model::{Model, ModelError};
use thiserror::Error;

use crate::action::Action;
use crate::monitor::{ActionId, ActionStatus};

/// Result type alias for plan operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type alias for monitor commits.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// An action or event precondition does not hold against the model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("node {0} is not offline")]
    NodeNotOffline(NodeId),

    #[error("node {0} is not online")]
    NodeNotOnline(NodeId),

    #[error("{vm} is not running on {node}")]
    NotRunningOn { vm: VmId, node: NodeId },

    #[error("{vm} is not sleeping on {node}")]
    NotSleepingOn { vm: VmId, node: NodeId },

    #[error("{vm} is not hosted on {node}")]
    NotHostedOn { vm: VmId, node: NodeId },

    #[error("{0} is not ready")]
    NotReady(VmId),

    #[error("{0} already exists")]
    AlreadyExists(VmId),

    #[error("{0} is unknown")]
    UnknownVm(VmId),

    #[error("source and destination are both {0}")]
    SameNode(NodeId),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A commit was refused by the [`Monitor`](crate::Monitor).
#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    #[error("action not part of the plan: {0}")]
    UnknownAction(Box<Action>),

    #[error("no action with id {0}")]
    UnknownId(ActionId),

    #[error("{action} is still blocked by {remaining} action(s)")]
    Blocked { action: Box<Action>, remaining: usize },

    #[error("{0} is already committed")]
    AlreadyCommitted(Box<Action>),

    #[error("{action} cannot start: it is {status}")]
    NotFeasible {
        action: Box<Action>,
        status: ActionStatus,
    },

    #[error("{action} failed to apply: {source}")]
    Apply {
        action: Box<Action>,
        #[source]
        source: ApplyError,
    },
}

/// Errors raised while building or applying a plan.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("invalid interval for {kind}: start {start} is after end {end}")]
    InvalidInterval {
        kind: String,
        start: Moment,
        end: Moment,
    },

    #[error("{action} failed to apply: {source}")]
    Apply {
        action: Box<Action>,
        #[source]
        source: ApplyError,
    },

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("deadlock after {committed}/{total} commits, {} action(s) blocked", blocked.len())]
    Deadlock {
        blocked: Vec<Action>,
        committed: usize,
        total: usize,
    },

    #[error(transparent)]
    Violation(#[from] Violation),
}

/// A constraint checker rejected part of a plan.
#[derive(Debug, Clone, Error)]
pub enum Violation {
    #[error("constraint '{constraint}' violated by {action}")]
    Continuous {
        constraint: String,
        action: Box<Action>,
    },

    #[error(
        "constraint '{constraint}' violated by the {} model",
        if *origin { "origin" } else { "resulting" }
    )]
    Discrete {
        constraint: String,
        model: Box<Model>,
        origin: bool,
    },

    #[error("the plan is not applyable: {0}")]
    NotApplyable(String),
}
