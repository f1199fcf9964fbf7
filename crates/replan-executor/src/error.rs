//! Executor error types.

use std::time::Duration;

use replan_plan::{Action, MonitorError};
use thiserror::Error;

/// Errors that stop a plan execution.
///
/// Every variant raised during a run carries the actions still blocked and
/// the actions started but not committed when the run stopped.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{action} failed: {source}")]
    ActionFailed {
        action: Box<Action>,
        #[source]
        source: anyhow::Error,
        blocked: Vec<Action>,
        pending: Vec<Action>,
    },

    #[error("{action} did not complete within {timeout:?}")]
    TimedOut {
        action: Box<Action>,
        timeout: Duration,
        blocked: Vec<Action>,
        pending: Vec<Action>,
    },

    #[error("{action} was refused at commit: {source}")]
    CommitRefused {
        action: Box<Action>,
        #[source]
        source: MonitorError,
        blocked: Vec<Action>,
        pending: Vec<Action>,
    },

    #[error("an action task panicked: {message}")]
    TaskPanicked {
        message: String,
        blocked: Vec<Action>,
        pending: Vec<Action>,
    },

    #[error("deadlock after {committed}/{total} commits, {} action(s) blocked", blocked.len())]
    Deadlock {
        blocked: Vec<Action>,
        pending: Vec<Action>,
        committed: usize,
        total: usize,
    },

    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
}

impl ExecutorError {
    /// Actions still waiting on a dependency when the run stopped.
    pub fn blocked(&self) -> &[Action] {
        match self {
            ExecutorError::ActionFailed { blocked, .. }
            | ExecutorError::TimedOut { blocked, .. }
            | ExecutorError::CommitRefused { blocked, .. }
            | ExecutorError::TaskPanicked { blocked, .. }
            | ExecutorError::Deadlock { blocked, .. } => blocked,
            ExecutorError::Monitor(_) => &[],
        }
    }

    /// Actions started but never committed.
    pub fn pending(&self) -> &[Action] {
        match self {
            ExecutorError::ActionFailed { pending, .. }
            | ExecutorError::TimedOut { pending, .. }
            | ExecutorError::CommitRefused { pending, .. }
            | ExecutorError::TaskPanicked { pending, .. }
            | ExecutorError::Deadlock { pending, .. } => pending,
            ExecutorError::Monitor(_) => &[],
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
