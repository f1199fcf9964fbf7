//! replan-executor: concurrent execution of reconfiguration plans.
//!
//! A [`PlanExecutor`] wraps a plan in a [`Monitor`](replan_plan::Monitor)
//! and runs every feasible action at once, each in its own tokio task.
//! The side effect of an action is delegated to a [`PracticalExecutor`];
//! once it succeeds the task commits the action and the actions it
//! released are launched in turn.
//!
//! # Architecture
//!
//! ```text
//! PlanExecutor
//!   ├── Monitor (shared, commit + release)
//!   ├── JoinSet (one task per launched action)
//!   │     └── PracticalExecutor::execute ─► Monitor::commit_id ─► listeners
//!   └── ExecutionReport | ExecutorError (failure, timeout, panic, deadlock)
//! ```

pub mod error;
pub mod executor;
pub mod practical;

pub use error::{ExecutorError, ExecutorResult};
pub use executor::{ExecutionReport, PlanExecutor};
pub use practical::{BoxFuture, PracticalExecutor, SimulatedExecutor};
