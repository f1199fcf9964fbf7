//! Apply a plan by sweeping its timeline, action ends first.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use replan_core::ApplierKind;
use replan_model::Model;

use crate::checker::{ConstraintChecker, ReconfigurationPlanChecker};
use crate::error::{PlanError, PlanResult};
use crate::event::Hook;
use crate::listener::Listeners;
use crate::plan::ReconfigurationPlan;
use crate::sweep::{self, Step};

use super::PlanApplier;

/// Walks the start/end sweep of the plan and applies each action at the
/// moment it ends. Registered constraint checkers see the same
/// notifications as with [`ReconfigurationPlanChecker`] and can veto the
/// run; the resulting model is the one this applier built.
#[derive(Debug, Default)]
pub struct MomentBasedApplier {
    listeners: Listeners,
    checkers: Mutex<ReconfigurationPlanChecker>,
}

impl MomentBasedApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_checker(&mut self, checker: Box<dyn ConstraintChecker>) {
        self.checkers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .add_checker(checker);
    }

    pub fn remove_checker(&mut self, name: &str) -> usize {
        self.checkers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_checker(name)
    }
}

impl PlanApplier for MomentBasedApplier {
    fn kind(&self) -> ApplierKind {
        ApplierKind::MomentBased
    }

    fn apply(&self, plan: &ReconfigurationPlan) -> PlanResult<Model> {
        let mut checkers = self.checkers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut mo = plan.origin().clone();
        checkers.starts_with(&mo)?;

        for step in sweep::steps(plan.actions()) {
            match step {
                Step::Start(a) => {
                    checkers.start(a)?;
                    checkers.events(a, Hook::Pre)?;
                }
                Step::End(a) => {
                    a.apply(&mut mo).map_err(|source| {
                        warn!(action = %a, error = %source, "moment-based application aborted");
                        PlanError::Apply {
                            action: Box::new(a.clone()),
                            source,
                        }
                    })?;
                    self.listeners.notify(a);
                    checkers.events(a, Hook::Post)?;
                    checkers.end(a)?;
                }
            }
        }

        checkers.ends_with(&mo)?;
        debug!(actions = plan.size(), duration = plan.duration(), "plan applied moment by moment");
        Ok(mo)
    }

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    fn listeners_mut(&mut self) -> &mut Listeners {
        &mut self.listeners
    }
}
