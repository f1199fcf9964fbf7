//! End-to-end runs of the executor against the synchronous appliers.

use std::sync::Arc;
use std::time::Duration;

use replan_core::{NodeId, VmId};
use replan_executor::{ExecutorError, PlanExecutor, SimulatedExecutor};
use replan_model::{Mapping, Model};
use replan_plan::{Action, DependencyBasedApplier, ReconfigurationPlan};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn n(id: u32) -> NodeId {
    NodeId(id)
}

fn vm(id: u32) -> VmId {
    VmId(id)
}

/// Four nodes to boot, each then hosting one VM, and a migration onto the
/// first booted node.
fn datacenter_plan() -> ReconfigurationPlan {
    let mut map = Mapping::new();
    map.add_online_node(n(0));
    for i in 1..=4 {
        map.add_offline_node(n(i)).unwrap();
        map.add_ready_vm(vm(i));
    }
    map.add_running_vm(vm(10), n(0)).unwrap();
    let mut plan = ReconfigurationPlan::new(Model::with_mapping(map));
    for i in 1..=4 {
        plan.add(Action::boot_node(n(i), 0, 3).unwrap());
        plan.add(Action::boot_vm(vm(i), n(i), 3, 5).unwrap());
    }
    plan.add(Action::migrate_vm(vm(10), n(0), n(1), 5, 8).unwrap());
    plan
}

#[tokio::test]
async fn matches_the_dependency_based_applier() {
    init_tracing();
    let plan = datacenter_plan();
    let (expected, waves) = DependencyBasedApplier::new().apply_in_waves(&plan).unwrap();

    let exec = PlanExecutor::new(Arc::new(SimulatedExecutor::new()));
    let report = exec.execute(&plan).await.unwrap();

    assert_eq!(report.model, expected);
    assert_eq!(report.model, plan.result().unwrap());
    assert_eq!(report.committed, plan.size());
    assert_eq!(report.waves, waves);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_actions_run_concurrently() {
    init_tracing();
    let plan = datacenter_plan();
    let sim = Arc::new(SimulatedExecutor::new().with_tick(Duration::from_millis(20)));
    let exec = PlanExecutor::new(sim.clone());

    let report = exec.execute(&plan).await.unwrap();
    assert_eq!(report.committed, 9);
    assert!(sim.peak_concurrency() >= 4, "peak was {}", sim.peak_concurrency());

    let executed = sim.executed();
    let pos = |a: &Action| executed.iter().position(|e| e == a).unwrap();
    for dep in plan.dependencies() {
        for b in dep.blockers() {
            assert!(pos(&plan.actions()[*b]) < pos(&plan.actions()[dep.action()]));
        }
    }
}

#[tokio::test]
async fn crossed_instant_migrations_deadlock() {
    init_tracing();
    let mut map = Mapping::new();
    map.add_online_node(n(1));
    map.add_online_node(n(2));
    map.add_running_vm(vm(1), n(1)).unwrap();
    map.add_running_vm(vm(2), n(2)).unwrap();
    let mut plan = ReconfigurationPlan::new(Model::with_mapping(map));
    // Each migration frees the node the other one needs, at the same moment.
    plan.add(Action::migrate_vm(vm(1), n(1), n(2), 3, 3).unwrap());
    plan.add(Action::migrate_vm(vm(2), n(2), n(1), 3, 3).unwrap());

    let sim = Arc::new(SimulatedExecutor::new());
    let exec = PlanExecutor::new(sim.clone());
    match exec.execute(&plan).await.unwrap_err() {
        ExecutorError::Deadlock {
            blocked,
            pending,
            committed,
            total,
        } => {
            assert_eq!(blocked.len(), 2);
            assert!(pending.is_empty());
            assert_eq!(committed, 0);
            assert_eq!(total, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(sim.executed().is_empty());
}

#[tokio::test]
async fn failure_stops_launching() {
    init_tracing();
    let plan = datacenter_plan();
    let broken = Action::boot_node(n(1), 0, 3).unwrap();
    let sim = Arc::new(SimulatedExecutor::new().failing_on(broken.clone()));
    let exec = PlanExecutor::new(sim.clone());

    let err = exec.execute(&plan).await.unwrap_err();
    assert!(matches!(&err, ExecutorError::ActionFailed { action, .. } if **action == broken));
    assert!(err.pending().contains(&broken));
    assert!(err.blocked().contains(&Action::boot_vm(vm(1), n(1), 3, 5).unwrap()));
    assert!(!sim.executed().iter().any(|a| a.start() >= 5));
}

#[tokio::test]
async fn repeated_runs_agree() {
    let plan = datacenter_plan();
    let exec = PlanExecutor::new(Arc::new(SimulatedExecutor::new()));
    let first = exec.execute(&plan).await.unwrap();
    let second = exec.execute(&plan).await.unwrap();
    assert_eq!(first, second);
}

/// `boot(vm4)` waits on a short chain (`shutdown(vm1)` then `migrate(vm2)`)
/// and on a single long `shutdown(vm3)` that commits last.
#[tokio::test(start_paused = true)]
async fn waves_follow_the_deepest_blocker() {
    init_tracing();
    let mut map = Mapping::new();
    map.add_online_node(n(1));
    map.add_online_node(n(2));
    map.add_running_vm(vm(1), n(2)).unwrap();
    map.add_running_vm(vm(2), n(1)).unwrap();
    map.add_running_vm(vm(3), n(1)).unwrap();
    map.add_ready_vm(vm(4));
    let mut plan = ReconfigurationPlan::new(Model::with_mapping(map));
    plan.add(Action::shutdown_vm(vm(1), n(2), 0, 1).unwrap());
    plan.add(Action::migrate_vm(vm(2), n(1), n(2), 1, 2).unwrap());
    plan.add(Action::shutdown_vm(vm(3), n(1), 0, 5).unwrap());
    plan.add(Action::boot_vm(vm(4), n(1), 5, 6).unwrap());

    let (expected, waves) = DependencyBasedApplier::new().apply_in_waves(&plan).unwrap();
    assert_eq!(waves, 3);

    let sim = Arc::new(SimulatedExecutor::new().with_tick(Duration::from_millis(10)));
    let report = PlanExecutor::new(sim).execute(&plan).await.unwrap();
    assert_eq!(report.waves, 3);
    assert_eq!(report.model, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failure_reports_settled_sets() {
    init_tracing();
    let mut map = Mapping::new();
    let mut plan_actions = Vec::new();
    for i in 0..64 {
        map.add_offline_node(n(i)).unwrap();
        plan_actions.push(Action::boot_node(n(i), 0, 1).unwrap());
    }
    let mut plan = ReconfigurationPlan::new(Model::with_mapping(map));
    for a in plan_actions {
        plan.add(a);
    }
    let broken = Action::boot_node(n(17), 0, 1).unwrap();
    let sim = Arc::new(SimulatedExecutor::new().failing_on(broken.clone()));
    let exec = PlanExecutor::new(sim.clone());

    let err = exec.execute(&plan).await.unwrap_err();
    assert!(err.pending().contains(&broken));
    // Whatever ran to completion was committed before the sets were taken.
    for done in sim.executed() {
        assert!(!err.pending().contains(&done), "{done} reported as pending");
    }
}
