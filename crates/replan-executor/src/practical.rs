//! The boundary where an action meets real infrastructure.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use replan_plan::Action;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Performs the side effect of an action.
///
/// Called at most once per action and run, possibly concurrently for
/// independent actions. An `Err` aborts the whole execution.
pub trait PracticalExecutor: Send + Sync + 'static {
    fn execute<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// A practical executor with no side effect.
///
/// Each action optionally sleeps `tick` per moment of its duration, so a
/// run replays the plan's timing. Selected actions can be made to fail.
#[derive(Debug, Default)]
pub struct SimulatedExecutor {
    tick: Option<Duration>,
    failing: BTreeSet<Action>,
    executed: Mutex<Vec<Action>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep `tick` per moment of each action's duration.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Make the execution of `action` fail.
    pub fn failing_on(mut self, action: Action) -> Self {
        self.failing.insert(action);
        self
    }

    /// Actions that completed successfully, in completion order.
    pub fn executed(&self) -> Vec<Action> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Highest number of actions in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl PracticalExecutor for SimulatedExecutor {
    fn execute<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if let Some(tick) = self.tick {
                tokio::time::sleep(tick * action.duration()).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(action) {
                anyhow::bail!("simulated failure of {}", action.kind());
            }
            debug!(%action, "simulated");
            self.executed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(action.clone());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replan_core::{NodeId, VmId};

    #[tokio::test]
    async fn records_successful_actions() {
        let exec = SimulatedExecutor::new();
        let a = Action::boot_node(NodeId(1), 0, 2).unwrap();
        exec.execute(&a).await.unwrap();
        assert_eq!(exec.executed(), vec![a]);
        assert_eq!(exec.peak_concurrency(), 1);
    }

    #[tokio::test]
    async fn fails_selected_actions() {
        let bad = Action::shutdown_vm(VmId(1), NodeId(1), 0, 1).unwrap();
        let exec = SimulatedExecutor::new().failing_on(bad.clone());
        let err = exec.execute(&bad).await.unwrap_err();
        assert!(err.to_string().contains("shutdown(vm=vm1, on=n1)"));
        assert!(exec.executed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_scales_with_duration() {
        let exec = SimulatedExecutor::new().with_tick(Duration::from_millis(10));
        let a = Action::boot_node(NodeId(1), 2, 5).unwrap();
        let started = tokio::time::Instant::now();
        exec.execute(&a).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
