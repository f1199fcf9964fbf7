//! Commit state machine over one execution of a plan.
//!
//! The monitor owns a working copy of the origin model and, for every
//! action, the set of actions still blocking it. Committing an action
//! applies it to the working model and releases its dependents.
//!
//! ```text
//! Blocked ──(last blocker committed)──► Feasible ──begin──► Pending
//!                                          │                   │
//!                                          └──────commit───────┴──► Committed
//! ```
//!
//! All run state lives in one struct behind one mutex; `commit` is short
//! and never blocks on I/O, so it is safe to call from many tasks.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use replan_model::Model;

use crate::action::Action;
use crate::error::{MonitorError, MonitorResult};
use crate::plan::ReconfigurationPlan;

/// Position of an action inside a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(pub usize);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an action during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// Waiting for at least one dependency to commit.
    Blocked,
    /// Every dependency committed; may start.
    Feasible,
    /// Started, not committed yet.
    Pending,
    Committed,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionStatus::Blocked => "blocked",
            ActionStatus::Feasible => "feasible",
            ActionStatus::Pending => "pending",
            ActionStatus::Committed => "committed",
        };
        f.write_str(s)
    }
}

/// Everything a commit touches.
struct RunState {
    model: Model,
    blockers: Vec<BTreeSet<usize>>,
    status: Vec<ActionStatus>,
    committed: usize,
}

pub struct Monitor {
    actions: Vec<Action>,
    index: HashMap<Action, usize>,
    /// Reverse edges: who is waiting on each action.
    dependents: Vec<Vec<usize>>,
    state: Mutex<RunState>,
}

impl Monitor {
    /// Start a run of `plan` on a fresh clone of its origin model.
    pub fn new(plan: &ReconfigurationPlan) -> Self {
        let actions = plan.actions().to_vec();
        let deps = plan.dependencies();

        let mut dependents = vec![Vec::new(); actions.len()];
        let mut blockers = Vec::with_capacity(actions.len());
        for d in deps {
            for b in d.blockers() {
                dependents[*b].push(d.action());
            }
            blockers.push(d.blockers().clone());
        }
        let status: Vec<ActionStatus> = blockers
            .iter()
            .map(|b| {
                if b.is_empty() {
                    ActionStatus::Feasible
                } else {
                    ActionStatus::Blocked
                }
            })
            .collect();
        let index = actions
            .iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), i))
            .collect();

        debug!(
            actions = actions.len(),
            feasible = status.iter().filter(|s| **s == ActionStatus::Feasible).count(),
            "monitor ready"
        );

        Self {
            actions,
            index,
            dependents,
            state: Mutex::new(RunState {
                model: plan.origin().clone(),
                blockers,
                status,
                committed: 0,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.actions.len()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// The action at `id`, `None` for an id this monitor never handed out.
    pub fn action(&self, id: ActionId) -> Option<&Action> {
        self.actions.get(id.0)
    }

    pub fn id_of(&self, action: &Action) -> Option<ActionId> {
        self.index.get(action).copied().map(ActionId)
    }

    /// Whether `action` still waits on at least one dependency.
    ///
    /// Unknown actions are reported as not blocked.
    pub fn is_blocked(&self, action: &Action) -> bool {
        self.id_of(action)
            .is_some_and(|id| !self.lock().blockers[id.0].is_empty())
    }

    pub fn status(&self, id: ActionId) -> Option<ActionStatus> {
        self.lock().status.get(id.0).copied()
    }

    pub fn feasible(&self) -> Vec<ActionId> {
        self.with_status(ActionStatus::Feasible)
    }

    pub fn blocked(&self) -> Vec<ActionId> {
        self.with_status(ActionStatus::Blocked)
    }

    pub fn pending(&self) -> Vec<ActionId> {
        self.with_status(ActionStatus::Pending)
    }

    pub fn nb_committed(&self) -> usize {
        self.lock().committed
    }

    pub fn is_over(&self) -> bool {
        self.nb_committed() == self.size()
    }

    /// Snapshot of the working model.
    pub fn current_model(&self) -> Model {
        self.lock().model.clone()
    }

    /// Mark a feasible action as started.
    pub fn begin(&self, id: ActionId) -> MonitorResult<()> {
        let action = self.checked(id)?;
        let mut st = self.lock();
        match st.status[id.0] {
            ActionStatus::Feasible => {
                st.status[id.0] = ActionStatus::Pending;
                trace!(%action, "pending");
                Ok(())
            }
            status => Err(MonitorError::NotFeasible {
                action: Box::new(action.clone()),
                status,
            }),
        }
    }

    /// Commit `action` and return the actions it made feasible.
    pub fn commit(&self, action: &Action) -> MonitorResult<Vec<Action>> {
        let id = self
            .id_of(action)
            .ok_or_else(|| MonitorError::UnknownAction(Box::new(action.clone())))?;
        Ok(self
            .commit_id(id)?
            .into_iter()
            .filter_map(|i| self.action(i).cloned())
            .collect())
    }

    /// Commit the action at `id` and return the ids it made feasible.
    ///
    /// The action is applied to the working model; on failure neither the
    /// model nor the bookkeeping change. An unknown id, a blocked or an
    /// already committed action is refused.
    pub fn commit_id(&self, id: ActionId) -> MonitorResult<Vec<ActionId>> {
        let action = self.checked(id)?;
        let mut guard = self.lock();
        let st = &mut *guard;

        match st.status[id.0] {
            ActionStatus::Committed => {
                return Err(MonitorError::AlreadyCommitted(Box::new(action.clone())));
            }
            ActionStatus::Blocked => {
                return Err(MonitorError::Blocked {
                    action: Box::new(action.clone()),
                    remaining: st.blockers[id.0].len(),
                });
            }
            ActionStatus::Feasible | ActionStatus::Pending => {}
        }

        action
            .apply(&mut st.model)
            .map_err(|source| MonitorError::Apply {
                action: Box::new(action.clone()),
                source,
            })?;

        st.status[id.0] = ActionStatus::Committed;
        st.committed += 1;

        let mut released = Vec::new();
        for &d in &self.dependents[id.0] {
            st.blockers[d].remove(&id.0);
            if st.blockers[d].is_empty() && st.status[d] == ActionStatus::Blocked {
                st.status[d] = ActionStatus::Feasible;
                released.push(ActionId(d));
            }
        }
        debug!(
            %action,
            committed = st.committed,
            released = released.len(),
            "action committed"
        );
        Ok(released)
    }

    fn checked(&self, id: ActionId) -> MonitorResult<&Action> {
        self.actions.get(id.0).ok_or(MonitorError::UnknownId(id))
    }

    fn with_status(&self, wanted: ActionStatus) -> Vec<ActionId> {
        self.lock()
            .status
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == wanted)
            .map(|(i, _)| ActionId(i))
            .collect()
    }

    /// Run state is only written after a successful apply, so a panic in
    /// another holder cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("actions", &self.actions.len())
            .field("committed", &self.nb_committed())
            .finish()
    }
}
