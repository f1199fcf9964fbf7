//! replan-plan: time-stamped reconfiguration plans and their application.
//!
//! A [`ReconfigurationPlan`] is a set of [`Action`]s (boot a node, migrate
//! a VM, change an allocation, ...) placed on a timeline, applied to a
//! clone of an origin [`Model`](replan_model::Model).
//!
//! # Components
//!
//! - **`event`** / **`action`**: the mutations and their effect on a model
//! - **`comparator`**: start/end ordering of actions
//! - **`dependency`**: precedence extraction (freeing before demanding)
//! - **`plan`**: the action set, cached dependencies, active applier
//! - **`monitor`**: commit state machine, safe under concurrent commits
//! - **`applier`**: time-based, dependency-based (waves) and moment-based
//! - **`checker`**: timeline sweep against pluggable constraint checkers
//! - **`listener`**: notifications fired after each successful commit
//!
//! # Flow
//!
//! ```text
//! ReconfigurationPlan ──► DependenciesExtractor ──► Vec<Dependency>
//!        │                                              │
//!        │                                              ▼
//!        ├──► PlanApplier (time / waves / moments)   Monitor ──► executor
//!        │
//!        └──► ReconfigurationPlanChecker (sweep, read-only)
//! ```

pub mod action;
pub mod applier;
pub mod capacity;
pub mod checker;
pub mod comparator;
pub mod dependency;
pub mod error;
pub mod event;
pub mod listener;
pub mod monitor;
pub mod plan;
pub mod sweep;

pub use action::{Action, ActionKind};
pub use applier::{
    DependencyBasedApplier, MomentBasedApplier, PlanApplier, TimeBasedApplier, applier_for,
};
pub use capacity::RunningCapacity;
pub use checker::{ConstraintChecker, ReconfigurationPlanChecker};
pub use comparator::{Bound, TimeComparator};
pub use dependency::{DependenciesExtractor, Dependency};
pub use error::{ApplyError, MonitorError, MonitorResult, PlanError, PlanResult, Violation};
pub use event::{Event, Hook};
pub use listener::{EventCommittedListener, Listeners};
pub use monitor::{ActionId, ActionStatus, Monitor};
pub use plan::ReconfigurationPlan;
