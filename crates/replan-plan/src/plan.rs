//! The reconfiguration plan: an origin model and a timeline of actions.

use std::fmt;
use std::sync::OnceLock;

use tracing::debug;

use replan_core::{Moment, PlanConfig};
use replan_model::Model;

use crate::action::Action;
use crate::applier::{self, PlanApplier, TimeBasedApplier};
use crate::comparator::TimeComparator;
use crate::dependency::{DependenciesExtractor, Dependency};
use crate::error::PlanResult;

/// A set of time-stamped actions to apply on a clone of `origin`.
///
/// Actions are kept sorted by start moment, then end moment. The set never
/// holds two equal actions.
///
/// Dependencies are extracted on first use and cached. Adding an action
/// drops the cache, so the next query recomputes them over the whole set.
pub struct ReconfigurationPlan {
    origin: Model,
    actions: Vec<Action>,
    dependencies: OnceLock<Vec<Dependency>>,
    applier: Box<dyn PlanApplier>,
}

impl ReconfigurationPlan {
    /// An empty plan applied with the time-based strategy.
    pub fn new(origin: Model) -> Self {
        Self {
            origin,
            actions: Vec::new(),
            dependencies: OnceLock::new(),
            applier: Box::new(TimeBasedApplier::new()),
        }
    }

    /// An empty plan using the applier selected in `config`.
    pub fn with_config(origin: Model, config: &PlanConfig) -> Self {
        let mut plan = Self::new(origin);
        plan.applier = applier::applier_for(config.applier);
        plan
    }

    /// Add an action. Returns `false` if an equal action is already present.
    pub fn add(&mut self, action: Action) -> bool {
        let cmp = TimeComparator::starts();
        match self
            .actions
            .binary_search_by(|probe| cmp.compare(probe, &action))
        {
            Ok(_) => false,
            Err(pos) => {
                self.actions.insert(pos, action);
                if self.dependencies.take().is_some() {
                    debug!("plan changed, dependencies will be recomputed");
                }
                true
            }
        }
    }

    /// The actions, sorted by start then end moment.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn contains(&self, action: &Action) -> bool {
        self.position(action).is_some()
    }

    /// Index of `action` in [`actions`](Self::actions).
    pub fn position(&self, action: &Action) -> Option<usize> {
        let cmp = TimeComparator::starts();
        self.actions
            .binary_search_by(|probe| cmp.compare(probe, action))
            .ok()
    }

    pub fn size(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The moment the last action ends, `0` for an empty plan.
    pub fn duration(&self) -> Moment {
        self.actions.iter().map(Action::end).max().unwrap_or(0)
    }

    pub fn origin(&self) -> &Model {
        &self.origin
    }

    /// One dependency per action, aligned with [`actions`](Self::actions).
    pub fn dependencies(&self) -> &[Dependency] {
        self.dependencies
            .get_or_init(|| DependenciesExtractor::extract(&self.origin, &self.actions))
    }

    /// The actions that must be committed before `action`. Empty for an
    /// action outside the plan.
    pub fn direct_dependencies(&self, action: &Action) -> Vec<&Action> {
        let Some(pos) = self.position(action) else {
            return Vec::new();
        };
        self.dependencies()[pos]
            .blockers()
            .iter()
            .map(|b| &self.actions[*b])
            .collect()
    }

    pub fn applier(&self) -> &dyn PlanApplier {
        self.applier.as_ref()
    }

    pub fn applier_mut(&mut self) -> &mut dyn PlanApplier {
        self.applier.as_mut()
    }

    pub fn set_applier(&mut self, applier: Box<dyn PlanApplier>) {
        self.applier = applier;
    }

    /// The model obtained by applying the plan with the active applier.
    pub fn result(&self) -> PlanResult<Model> {
        self.applier.apply(self)
    }

    pub fn is_applyable(&self) -> bool {
        self.result().is_ok()
    }
}

impl<'a> IntoIterator for &'a ReconfigurationPlan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for ReconfigurationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for a in &self.actions {
            writeln!(f, "{a}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ReconfigurationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconfigurationPlan")
            .field("origin", &self.origin)
            .field("actions", &self.actions)
            .field("applier", &self.applier)
            .finish()
    }
}
