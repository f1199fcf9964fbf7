//! Apply a plan in waves of feasible actions.

use tracing::{debug, warn};

use replan_core::ApplierKind;
use replan_model::Model;

use crate::error::{PlanError, PlanResult};
use crate::listener::Listeners;
use crate::monitor::{ActionId, Monitor};
use crate::plan::ReconfigurationPlan;

use super::PlanApplier;

/// Commits every feasible action, then every action those commits
/// released, and so on until the plan is exhausted.
///
/// The number of waves is bounded by the longest dependency chain. A wave
/// that comes up empty while actions remain uncommitted means the
/// dependencies are cyclic; the run stops with [`PlanError::Deadlock`].
#[derive(Debug, Default)]
pub struct DependencyBasedApplier {
    listeners: Listeners,
}

impl DependencyBasedApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `plan` and return the resulting model with the number of waves.
    pub fn apply_in_waves(&self, plan: &ReconfigurationPlan) -> PlanResult<(Model, usize)> {
        let monitor = Monitor::new(plan);
        let mut wave: Vec<ActionId> = monitor.feasible();
        let mut waves = 0;

        while monitor.nb_committed() < monitor.size() {
            if wave.is_empty() {
                let blocked: Vec<_> = monitor
                    .blocked()
                    .into_iter()
                    .filter_map(|id| monitor.action(id).cloned())
                    .collect();
                warn!(
                    committed = monitor.nb_committed(),
                    blocked = blocked.len(),
                    "no feasible action left"
                );
                return Err(PlanError::Deadlock {
                    blocked,
                    committed: monitor.nb_committed(),
                    total: monitor.size(),
                });
            }
            waves += 1;
            let mut next = Vec::new();
            for id in wave {
                next.extend(monitor.commit_id(id)?);
                if let Some(action) = monitor.action(id) {
                    self.listeners.notify(action);
                }
            }
            debug!(wave = waves, released = next.len(), "wave committed");
            wave = next;
        }
        Ok((monitor.current_model(), waves))
    }
}

impl PlanApplier for DependencyBasedApplier {
    fn kind(&self) -> ApplierKind {
        ApplierKind::DependencyBased
    }

    fn apply(&self, plan: &ReconfigurationPlan) -> PlanResult<Model> {
        self.apply_in_waves(plan).map(|(mo, _)| mo)
    }

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    fn listeners_mut(&mut self) -> &mut Listeners {
        &mut self.listeners
    }
}
