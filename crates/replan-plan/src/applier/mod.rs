//! Strategies turning a plan into its resulting model.
//!
//! - **`time_based`**: every action in start order, no concurrency model
//! - **`dependency_based`**: waves of feasible actions through a [`Monitor`](crate::Monitor)
//! - **`moment_based`**: the checker's start/end sweep, applying actions as they end

use std::fmt;
use std::sync::Arc;

use replan_core::ApplierKind;
use replan_model::Model;

use crate::error::PlanResult;
use crate::listener::{EventCommittedListener, Listeners};
use crate::plan::ReconfigurationPlan;

pub mod dependency_based;
pub mod moment_based;
pub mod time_based;

pub use dependency_based::DependencyBasedApplier;
pub use moment_based::MomentBasedApplier;
pub use time_based::TimeBasedApplier;

/// Applies a plan on a fresh clone of its origin model.
///
/// Runs are independent: applying the same plan twice gives equal models.
/// A failing run returns the error and discards its working model.
pub trait PlanApplier: fmt::Debug + Send + Sync {
    fn kind(&self) -> ApplierKind;

    fn apply(&self, plan: &ReconfigurationPlan) -> PlanResult<Model>;

    fn listeners(&self) -> &Listeners;

    fn listeners_mut(&mut self) -> &mut Listeners;

    /// Be notified after every successful commit.
    fn add_listener(&mut self, listener: Arc<dyn EventCommittedListener>) {
        self.listeners_mut().add(listener);
    }
}

/// The default-configured applier of a given kind.
pub fn applier_for(kind: ApplierKind) -> Box<dyn PlanApplier> {
    match kind {
        ApplierKind::TimeBased => Box::new(TimeBasedApplier::new()),
        ApplierKind::DependencyBased => Box::new(DependencyBasedApplier::new()),
        ApplierKind::MomentBased => Box::new(MomentBasedApplier::new()),
    }
}
