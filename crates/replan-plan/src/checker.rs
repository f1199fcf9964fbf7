//! Validation of a plan against pluggable constraint checkers.
//!
//! The checker walks the plan timeline (see [`sweep`](crate::sweep)) and
//! tells every registered [`ConstraintChecker`] about the origin model, each
//! action start and end, each hooked event, and finally the resulting
//! model. The first rejection aborts the sweep with a [`Violation`].

use tracing::{debug, info, warn};

use replan_model::Model;

use crate::action::Action;
use crate::error::Violation;
use crate::event::{Event, Hook};
use crate::plan::ReconfigurationPlan;
use crate::sweep::{self, Step};

/// A semantic constraint evaluated along a plan.
///
/// Every predicate accepts by default, so implementations only override
/// what their constraint cares about. `starts_with` is called first on each
/// sweep and is the place to reset any tracking state.
pub trait ConstraintChecker: Send {
    /// Name of the checked constraint, reported on violation.
    fn name(&self) -> &str;

    fn starts_with(&mut self, _origin: &Model) -> bool {
        true
    }

    fn start(&mut self, _action: &Action) -> bool {
        true
    }

    fn end(&mut self, _action: &Action) -> bool {
        true
    }

    fn consume(&mut self, _event: &Event) -> bool {
        true
    }

    fn ends_with(&mut self, _result: &Model) -> bool {
        true
    }
}

/// Runs a sweep of a plan against a list of constraint checkers.
#[derive(Default)]
pub struct ReconfigurationPlanChecker {
    checkers: Vec<Box<dyn ConstraintChecker>>,
}

impl ReconfigurationPlanChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_checker(&mut self, checker: Box<dyn ConstraintChecker>) {
        self.checkers.push(checker);
    }

    /// Remove the checkers of the given constraint. Returns how many were removed.
    pub fn remove_checker(&mut self, name: &str) -> usize {
        let before = self.checkers.len();
        self.checkers.retain(|c| c.name() != name);
        before - self.checkers.len()
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Check `plan` from its origin to its result.
    ///
    /// The plan itself is never modified; the resulting model comes from
    /// [`ReconfigurationPlan::result`].
    pub fn check(&mut self, plan: &ReconfigurationPlan) -> Result<(), Violation> {
        if self.checkers.is_empty() {
            return Ok(());
        }
        self.starts_with(plan.origin())?;

        for step in sweep::steps(plan.actions()) {
            match step {
                Step::End(a) => {
                    self.events(a, Hook::Post)?;
                    self.end(a)?;
                }
                Step::Start(a) => {
                    self.start(a)?;
                    self.events(a, Hook::Pre)?;
                }
            }
        }

        let result = plan.result().map_err(|e| {
            warn!(error = %e, "plan checked but not applyable");
            Violation::NotApplyable(e.to_string())
        })?;
        self.ends_with(&result)?;
        info!(actions = plan.size(), checkers = self.checkers.len(), "plan satisfies every constraint");
        Ok(())
    }

    pub(crate) fn starts_with(&mut self, origin: &Model) -> Result<(), Violation> {
        for c in &mut self.checkers {
            if !c.starts_with(origin) {
                return Err(discrete(c.name(), origin, true));
            }
        }
        Ok(())
    }

    pub(crate) fn ends_with(&mut self, result: &Model) -> Result<(), Violation> {
        for c in &mut self.checkers {
            if !c.ends_with(result) {
                return Err(discrete(c.name(), result, false));
            }
        }
        Ok(())
    }

    pub(crate) fn start(&mut self, a: &Action) -> Result<(), Violation> {
        for c in &mut self.checkers {
            if !c.start(a) {
                return Err(continuous(c.name(), a));
            }
        }
        Ok(())
    }

    pub(crate) fn end(&mut self, a: &Action) -> Result<(), Violation> {
        for c in &mut self.checkers {
            if !c.end(a) {
                return Err(continuous(c.name(), a));
            }
        }
        Ok(())
    }

    pub(crate) fn events(&mut self, a: &Action, hook: Hook) -> Result<(), Violation> {
        for e in a.events(hook) {
            for c in &mut self.checkers {
                if !c.consume(e) {
                    return Err(continuous(c.name(), a));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ReconfigurationPlanChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.checkers.iter().map(|c| c.name()))
            .finish()
    }
}

fn continuous(constraint: &str, action: &Action) -> Violation {
    debug!(constraint, %action, "continuous violation");
    Violation::Continuous {
        constraint: constraint.to_string(),
        action: Box::new(action.clone()),
    }
}

fn discrete(constraint: &str, model: &Model, origin: bool) -> Violation {
    debug!(constraint, origin, "discrete violation");
    Violation::Discrete {
        constraint: constraint.to_string(),
        model: Box::new(model.clone()),
        origin,
    }
}
