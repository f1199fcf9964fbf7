//! Apply every action in start order on a single working model.

use tracing::{debug, warn};

use replan_core::ApplierKind;
use replan_model::Model;

use crate::action::Action;
use crate::comparator::{Bound, TimeComparator};
use crate::error::{PlanError, PlanResult};
use crate::listener::Listeners;
use crate::plan::ReconfigurationPlan;

use super::PlanApplier;

/// Applies actions sorted by start, then end moment, ignoring dependencies.
///
/// Only correct when the plan's timing already respects every precedence.
#[derive(Debug, Default)]
pub struct TimeBasedApplier {
    listeners: Listeners,
}

impl TimeBasedApplier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlanApplier for TimeBasedApplier {
    fn kind(&self) -> ApplierKind {
        ApplierKind::TimeBased
    }

    fn apply(&self, plan: &ReconfigurationPlan) -> PlanResult<Model> {
        let cmp = TimeComparator::new(Bound::Start, false);
        let mut ordered: Vec<&Action> = plan.iter().collect();
        ordered.sort_by(|a, b| cmp.compare(a, b));

        let mut mo = plan.origin().clone();
        for a in ordered {
            a.apply(&mut mo).map_err(|source| {
                warn!(action = %a, error = %source, "time-based application aborted");
                PlanError::Apply {
                    action: Box::new(a.clone()),
                    source,
                }
            })?;
            self.listeners.notify(a);
        }
        debug!(actions = plan.size(), "plan applied in time order");
        Ok(mo)
    }

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    fn listeners_mut(&mut self) -> &mut Listeners {
        &mut self.listeners
    }
}
