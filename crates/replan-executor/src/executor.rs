//! Plan executor: runs feasible actions concurrently until the plan is over.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use replan_core::ExecutorConfig;
use replan_model::Model;
use replan_plan::{
    Action, ActionId, EventCommittedListener, Listeners, Monitor, MonitorError,
    ReconfigurationPlan,
};

use crate::error::{ExecutorError, ExecutorResult};
use crate::practical::PracticalExecutor;

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// The model once every action committed.
    pub model: Model,
    pub committed: usize,
    /// Length of the longest launch chain: 1 when every action was feasible
    /// from the start, 0 for an empty plan.
    pub waves: usize,
}

/// Why a single action task stopped.
enum TaskFailure {
    Failed(anyhow::Error),
    TimedOut(Duration),
    Refused(MonitorError),
}

struct TaskOutcome {
    id: ActionId,
    action: Action,
    result: Result<Vec<ActionId>, TaskFailure>,
}

/// Drives a plan to completion over a [`PracticalExecutor`].
///
/// Every feasible action gets its own tokio task. A task runs the practical
/// executor, commits the action on the shared [`Monitor`] and reports the
/// actions it released, which are launched right away. There is no cap on
/// the number of tasks in flight.
///
/// The first failure aborts the remaining tasks and stops the run. A run
/// that drains every task while actions are still blocked is a deadlock.
pub struct PlanExecutor {
    practical: Arc<dyn PracticalExecutor>,
    task_timeout: Option<Duration>,
    listeners: Listeners,
}

impl PlanExecutor {
    pub fn new(practical: Arc<dyn PracticalExecutor>) -> Self {
        Self {
            practical,
            task_timeout: None,
            listeners: Listeners::new(),
        }
    }

    /// Apply the executor section of the configuration.
    pub fn with_config(mut self, config: &ExecutorConfig) -> Self {
        self.task_timeout = config.task_timeout();
        self
    }

    /// Fail any action whose practical execution exceeds `timeout`.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout
    }

    /// Be notified after every commit.
    pub fn add_listener(&mut self, listener: Arc<dyn EventCommittedListener>) {
        self.listeners.add(listener);
    }

    /// Execute `plan` from a fresh clone of its origin model.
    pub async fn execute(&self, plan: &ReconfigurationPlan) -> ExecutorResult<ExecutionReport> {
        let monitor = Arc::new(Monitor::new(plan));
        let mut depth = vec![0usize; monitor.size()];
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();

        let seed = monitor.feasible();
        info!(
            actions = monitor.size(),
            feasible = seed.len(),
            timeout = ?self.task_timeout,
            "executing plan"
        );
        for id in &seed {
            depth[id.0] = 1;
        }
        self.launch(&monitor, &mut tasks, seed)?;

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    let message = if join_error.is_panic() {
                        "action task panicked".to_string()
                    } else {
                        "action task was cancelled".to_string()
                    };
                    error!(error = %message, "task join error");
                    drain(&mut tasks).await;
                    return Err(ExecutorError::TaskPanicked {
                        message,
                        blocked: actions(&monitor, monitor.blocked()),
                        pending: actions(&monitor, monitor.pending()),
                    });
                }
            };

            match outcome.result {
                Ok(released) => {
                    // Monitor ids are plan positions. Every blocker of a
                    // released action has committed, so its depth is final.
                    let deps = plan.dependencies();
                    for id in &released {
                        let deepest = deps
                            .get(id.0)
                            .and_then(|d| d.blockers().iter().map(|b| depth[*b]).max())
                            .unwrap_or(depth[outcome.id.0]);
                        depth[id.0] = deepest + 1;
                    }
                    self.launch(&monitor, &mut tasks, released)?;
                }
                Err(failure) => {
                    drain(&mut tasks).await;
                    return Err(stopped(&monitor, outcome.action, failure));
                }
            }
        }

        if !monitor.is_over() {
            let blocked = actions(&monitor, monitor.blocked());
            warn!(
                blocked = blocked.len(),
                committed = monitor.nb_committed(),
                total = monitor.size(),
                "no action left to run, plan deadlocked"
            );
            return Err(ExecutorError::Deadlock {
                blocked,
                pending: actions(&monitor, monitor.pending()),
                committed: monitor.nb_committed(),
                total: monitor.size(),
            });
        }

        let report = ExecutionReport {
            model: monitor.current_model(),
            committed: monitor.nb_committed(),
            waves: depth.iter().copied().max().unwrap_or(0),
        };
        info!(committed = report.committed, waves = report.waves, "plan executed");
        Ok(report)
    }

    fn launch(
        &self,
        monitor: &Arc<Monitor>,
        tasks: &mut JoinSet<TaskOutcome>,
        ids: Vec<ActionId>,
    ) -> ExecutorResult<()> {
        for id in ids {
            let action = monitor
                .action(id)
                .cloned()
                .ok_or(MonitorError::UnknownId(id))?;
            monitor.begin(id)?;
            debug!(%action, "launching");

            let monitor = Arc::clone(monitor);
            let practical = Arc::clone(&self.practical);
            let listeners = self.listeners.clone();
            let timeout = self.task_timeout;

            tasks.spawn(async move {
                let run = practical.execute(&action);
                let executed = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, run).await {
                        Ok(result) => result.map_err(TaskFailure::Failed),
                        Err(_) => Err(TaskFailure::TimedOut(limit)),
                    },
                    None => run.await.map_err(TaskFailure::Failed),
                };
                let result = executed.and_then(|()| {
                    let released = monitor.commit_id(id).map_err(TaskFailure::Refused)?;
                    listeners.notify(&action);
                    Ok(released)
                });
                TaskOutcome { id, action, result }
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("task_timeout", &self.task_timeout)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

/// Abort the remaining tasks and wait for them, so that the monitor no
/// longer changes once this returns.
async fn drain(tasks: &mut JoinSet<TaskOutcome>) {
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}

fn actions(monitor: &Monitor, ids: Vec<ActionId>) -> Vec<Action> {
    ids.into_iter()
        .filter_map(|id| monitor.action(id).cloned())
        .collect()
}

fn stopped(monitor: &Monitor, action: Action, failure: TaskFailure) -> ExecutorError {
    let action = Box::new(action);
    let blocked = actions(monitor, monitor.blocked());
    let pending = actions(monitor, monitor.pending());
    match failure {
        TaskFailure::Failed(source) => {
            error!(%action, error = %source, "action failed, execution stopped");
            ExecutorError::ActionFailed {
                action,
                source,
                blocked,
                pending,
            }
        }
        TaskFailure::TimedOut(timeout) => {
            error!(%action, ?timeout, "action timed out, execution stopped");
            ExecutorError::TimedOut {
                action,
                timeout,
                blocked,
                pending,
            }
        }
        TaskFailure::Refused(source) => {
            error!(%action, error = %source, "commit refused, execution stopped");
            ExecutorError::CommitRefused {
                action,
                source,
                blocked,
                pending,
            }
        }
    }
}
