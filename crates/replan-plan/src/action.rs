//! Time-bounded actions and their state transitions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use replan_core::{Moment, NodeId, VmId};
use replan_model::{Model, VmState};

use crate::error::{ApplyError, PlanError, PlanResult};
use crate::event::{Event, Hook};

/// The state transition an action performs, with the nodes and VMs it touches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    BootNode {
        node: NodeId,
    },
    ShutdownNode {
        node: NodeId,
    },
    ForgeVm {
        vm: VmId,
    },
    BootVm {
        vm: VmId,
        node: NodeId,
    },
    ShutdownVm {
        vm: VmId,
        node: NodeId,
    },
    MigrateVm {
        vm: VmId,
        src: NodeId,
        dst: NodeId,
        bandwidth: u32,
    },
    SuspendVm {
        vm: VmId,
        src: NodeId,
        dst: NodeId,
    },
    ResumeVm {
        vm: VmId,
        src: NodeId,
        dst: NodeId,
    },
    KillVm {
        vm: VmId,
        node: Option<NodeId>,
    },
    Allocate {
        vm: VmId,
        node: NodeId,
        resource: String,
        amount: u32,
    },
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::BootNode { .. } => "boot_node",
            ActionKind::ShutdownNode { .. } => "shutdown_node",
            ActionKind::ForgeVm { .. } => "forge",
            ActionKind::BootVm { .. } => "boot",
            ActionKind::ShutdownVm { .. } => "shutdown",
            ActionKind::MigrateVm { .. } => "migrate",
            ActionKind::SuspendVm { .. } => "suspend",
            ActionKind::ResumeVm { .. } => "resume",
            ActionKind::KillVm { .. } => "kill",
            ActionKind::Allocate { .. } => "allocate",
        }
    }

    /// The VM manipulated by the action, if any.
    pub fn vm(&self) -> Option<VmId> {
        match self {
            ActionKind::BootNode { .. } | ActionKind::ShutdownNode { .. } => None,
            ActionKind::ForgeVm { vm }
            | ActionKind::BootVm { vm, .. }
            | ActionKind::ShutdownVm { vm, .. }
            | ActionKind::MigrateVm { vm, .. }
            | ActionKind::SuspendVm { vm, .. }
            | ActionKind::ResumeVm { vm, .. }
            | ActionKind::KillVm { vm, .. }
            | ActionKind::Allocate { vm, .. } => Some(*vm),
        }
    }

    fn apply(&self, mo: &mut Model) -> Result<(), ApplyError> {
        let map = mo.mapping_mut();
        match self {
            ActionKind::BootNode { node } => {
                if !map.is_offline(*node) {
                    return Err(ApplyError::NodeNotOffline(*node));
                }
                map.add_online_node(*node);
            }
            ActionKind::ShutdownNode { node } => {
                if !map.is_online(*node) {
                    return Err(ApplyError::NodeNotOnline(*node));
                }
                map.add_offline_node(*node)?;
            }
            ActionKind::ForgeVm { vm } => {
                if map.contains_vm(*vm) {
                    return Err(ApplyError::AlreadyExists(*vm));
                }
                map.add_ready_vm(*vm);
            }
            ActionKind::BootVm { vm, node } => {
                if !map.is_ready(*vm) {
                    return Err(ApplyError::NotReady(*vm));
                }
                map.add_running_vm(*vm, *node)?;
            }
            ActionKind::ShutdownVm { vm, node } => {
                expect_state(map.vm_state(*vm), *vm, VmState::Running(*node))?;
                map.add_ready_vm(*vm);
            }
            ActionKind::MigrateVm { vm, src, dst, .. } => {
                if src == dst {
                    return Err(ApplyError::SameNode(*src));
                }
                expect_state(map.vm_state(*vm), *vm, VmState::Running(*src))?;
                map.add_running_vm(*vm, *dst)?;
            }
            ActionKind::SuspendVm { vm, src, dst } => {
                expect_state(map.vm_state(*vm), *vm, VmState::Running(*src))?;
                map.add_sleeping_vm(*vm, *dst)?;
            }
            ActionKind::ResumeVm { vm, src, dst } => {
                expect_state(map.vm_state(*vm), *vm, VmState::Sleeping(*src))?;
                map.add_running_vm(*vm, *dst)?;
            }
            ActionKind::KillVm { vm, node } => {
                if !map.contains_vm(*vm) {
                    return Err(ApplyError::UnknownVm(*vm));
                }
                if let Some(node) = node {
                    if map.vm_location(*vm) != Some(*node) {
                        return Err(ApplyError::NotHostedOn {
                            vm: *vm,
                            node: *node,
                        });
                    }
                }
                map.remove_vm(*vm);
            }
            ActionKind::Allocate {
                vm,
                node,
                resource,
                amount,
            } => {
                if map.vm_location(*vm) != Some(*node) {
                    return Err(ApplyError::NotHostedOn {
                        vm: *vm,
                        node: *node,
                    });
                }
                mo.resource_mut(resource)?.set_consumption(*vm, *amount);
            }
        }
        Ok(())
    }
}

fn expect_state(actual: Option<VmState>, vm: VmId, expected: VmState) -> Result<(), ApplyError> {
    match (actual, expected) {
        (Some(a), e) if a == e => Ok(()),
        (None, _) => Err(ApplyError::UnknownVm(vm)),
        (_, VmState::Running(node)) => Err(ApplyError::NotRunningOn { vm, node }),
        (_, VmState::Sleeping(node)) => Err(ApplyError::NotSleepingOn { vm, node }),
        (_, VmState::Ready) => Err(ApplyError::NotReady(vm)),
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::BootNode { node } => write!(f, "boot_node(node={node})"),
            ActionKind::ShutdownNode { node } => write!(f, "shutdown_node(node={node})"),
            ActionKind::ForgeVm { vm } => write!(f, "forge(vm={vm})"),
            ActionKind::BootVm { vm, node } => write!(f, "boot(vm={vm}, on={node})"),
            ActionKind::ShutdownVm { vm, node } => write!(f, "shutdown(vm={vm}, on={node})"),
            ActionKind::MigrateVm {
                vm,
                src,
                dst,
                bandwidth,
            } => write!(f, "migrate(vm={vm}, from={src}, to={dst}, bw={bandwidth})"),
            ActionKind::SuspendVm { vm, src, dst } => {
                write!(f, "suspend(vm={vm}, from={src}, to={dst})")
            }
            ActionKind::ResumeVm { vm, src, dst } => {
                write!(f, "resume(vm={vm}, from={src}, to={dst})")
            }
            ActionKind::KillVm { vm, node: Some(n) } => write!(f, "kill(vm={vm}, on={n})"),
            ActionKind::KillVm { vm, node: None } => write!(f, "kill(vm={vm})"),
            ActionKind::Allocate {
                vm,
                node,
                resource,
                amount,
            } => write!(f, "allocate(vm={vm}, on={node}, rc={resource}, amount={amount})"),
        }
    }
}

/// An [`ActionKind`] scheduled on `[start, end]`, with events hooked before
/// and after its transition.
///
/// Equality, hashing and ordering are structural over every field, so two
/// actions are interchangeable only if they do exactly the same thing at
/// exactly the same moments.
///
/// Deserialized actions go through [`Action::new`], so an inverted interval
/// is rejected there too.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawAction")]
pub struct Action {
    start: Moment,
    end: Moment,
    kind: ActionKind,
    events: BTreeMap<Hook, BTreeSet<Event>>,
}

/// Unchecked wire form of an [`Action`].
#[derive(Deserialize)]
struct RawAction {
    start: Moment,
    end: Moment,
    kind: ActionKind,
    #[serde(default)]
    events: BTreeMap<Hook, BTreeSet<Event>>,
}

impl TryFrom<RawAction> for Action {
    type Error = PlanError;

    fn try_from(raw: RawAction) -> PlanResult<Self> {
        let mut action = Action::new(raw.kind, raw.start, raw.end)?;
        action.events = raw.events;
        Ok(action)
    }
}

impl Action {
    pub fn new(kind: ActionKind, start: Moment, end: Moment) -> PlanResult<Self> {
        if start > end {
            return Err(PlanError::InvalidInterval {
                kind: kind.name().to_string(),
                start,
                end,
            });
        }
        Ok(Self {
            start,
            end,
            kind,
            events: BTreeMap::new(),
        })
    }

    pub fn boot_node(node: NodeId, start: Moment, end: Moment) -> PlanResult<Self> {
        Self::new(ActionKind::BootNode { node }, start, end)
    }

    pub fn shutdown_node(node: NodeId, start: Moment, end: Moment) -> PlanResult<Self> {
        Self::new(ActionKind::ShutdownNode { node }, start, end)
    }

    pub fn forge_vm(vm: VmId, start: Moment, end: Moment) -> PlanResult<Self> {
        Self::new(ActionKind::ForgeVm { vm }, start, end)
    }

    pub fn boot_vm(vm: VmId, node: NodeId, start: Moment, end: Moment) -> PlanResult<Self> {
        Self::new(ActionKind::BootVm { vm, node }, start, end)
    }

    pub fn shutdown_vm(vm: VmId, node: NodeId, start: Moment, end: Moment) -> PlanResult<Self> {
        Self::new(ActionKind::ShutdownVm { vm, node }, start, end)
    }

    pub fn migrate_vm(
        vm: VmId,
        src: NodeId,
        dst: NodeId,
        start: Moment,
        end: Moment,
    ) -> PlanResult<Self> {
        Self::new(
            ActionKind::MigrateVm {
                vm,
                src,
                dst,
                bandwidth: 0,
            },
            start,
            end,
        )
    }

    pub fn suspend_vm(
        vm: VmId,
        src: NodeId,
        dst: NodeId,
        start: Moment,
        end: Moment,
    ) -> PlanResult<Self> {
        Self::new(ActionKind::SuspendVm { vm, src, dst }, start, end)
    }

    pub fn resume_vm(
        vm: VmId,
        src: NodeId,
        dst: NodeId,
        start: Moment,
        end: Moment,
    ) -> PlanResult<Self> {
        Self::new(ActionKind::ResumeVm { vm, src, dst }, start, end)
    }

    pub fn kill_vm(vm: VmId, node: Option<NodeId>, start: Moment, end: Moment) -> PlanResult<Self> {
        Self::new(ActionKind::KillVm { vm, node }, start, end)
    }

    pub fn allocate(
        vm: VmId,
        node: NodeId,
        resource: &str,
        amount: u32,
        start: Moment,
        end: Moment,
    ) -> PlanResult<Self> {
        Self::new(
            ActionKind::Allocate {
                vm,
                node,
                resource: resource.to_string(),
                amount,
            },
            start,
            end,
        )
    }

    /// Set the bandwidth of a migration. Other kinds are returned unchanged.
    pub fn with_bandwidth(mut self, bw: u32) -> Self {
        if let ActionKind::MigrateVm { bandwidth, .. } = &mut self.kind {
            *bandwidth = bw;
        }
        self
    }

    /// Attach an event, builder style.
    pub fn with_event(mut self, hook: Hook, event: Event) -> Self {
        self.add_event(hook, event);
        self
    }

    pub fn start(&self) -> Moment {
        self.start
    }

    pub fn end(&self) -> Moment {
        self.end
    }

    pub fn duration(&self) -> Moment {
        self.end - self.start
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Attach an event. Returns `false` if it was already attached to this hook.
    pub fn add_event(&mut self, hook: Hook, event: Event) -> bool {
        self.events.entry(hook).or_default().insert(event)
    }

    pub fn events(&self, hook: Hook) -> impl Iterator<Item = &Event> {
        self.events.get(&hook).into_iter().flatten()
    }

    /// Apply the `Pre` events, the transition, then the `Post` events.
    ///
    /// Either every step succeeds and `mo` is updated, or `mo` is left
    /// untouched.
    pub fn apply(&self, mo: &mut Model) -> Result<(), ApplyError> {
        let mut scratch = mo.clone();
        self.apply_events(Hook::Pre, &mut scratch)?;
        self.apply_action(&mut scratch)?;
        self.apply_events(Hook::Post, &mut scratch)?;
        *mo = scratch;
        Ok(())
    }

    /// Apply only the events attached to `hook`. Not atomic.
    pub fn apply_events(&self, hook: Hook, mo: &mut Model) -> Result<(), ApplyError> {
        self.events(hook).try_for_each(|e| e.apply(mo))
    }

    /// Apply only the transition. Not atomic.
    pub fn apply_action(&self, mo: &mut Model) -> Result<(), ApplyError> {
        self.kind.apply(mo)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {{action={}", self.start, self.end, self.kind)?;
        for (hook, events) in &self.events {
            if events.is_empty() {
                continue;
            }
            write!(f, ", @{hook}= {{")?;
            for (i, e) in events.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{e}")?;
            }
            write!(f, "}}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replan_model::{Mapping, ShareableResource};

    fn n(id: u32) -> NodeId {
        NodeId(id)
    }

    fn vm(id: u32) -> VmId {
        VmId(id)
    }

    fn model() -> Model {
        let mut map = Mapping::new();
        map.add_online_node(n(1));
        map.add_online_node(n(2));
        map.add_offline_node(n(3)).unwrap();
        map.add_running_vm(vm(1), n(1)).unwrap();
        map.add_sleeping_vm(vm(2), n(1)).unwrap();
        map.add_ready_vm(vm(3));
        let mut mo = Model::with_mapping(map);
        let mut cpu = ShareableResource::new("cpu");
        cpu.set_consumption(vm(1), 3);
        mo.attach(cpu);
        mo
    }

    #[test]
    fn rejects_inverted_interval() {
        let err = Action::boot_node(n(1), 5, 3).unwrap_err();
        assert!(matches!(err, PlanError::InvalidInterval { start: 5, end: 3, .. }));
    }

    #[test]
    fn boot_and_shutdown_node() {
        let mut mo = model();
        Action::boot_node(n(3), 0, 2).unwrap().apply(&mut mo).unwrap();
        assert!(mo.mapping().is_online(n(3)));
        Action::shutdown_node(n(3), 2, 4).unwrap().apply(&mut mo).unwrap();
        assert!(mo.mapping().is_offline(n(3)));

        let err = Action::shutdown_node(n(1), 0, 1).unwrap().apply(&mut mo).unwrap_err();
        assert!(matches!(err, ApplyError::Model(_)));
        let err = Action::boot_node(n(1), 0, 1).unwrap().apply(&mut mo).unwrap_err();
        assert_eq!(err, ApplyError::NodeNotOffline(n(1)));
    }

    #[test]
    fn vm_lifecycle() {
        let mut mo = model();
        Action::forge_vm(vm(4), 0, 1).unwrap().apply(&mut mo).unwrap();
        Action::boot_vm(vm(4), n(2), 1, 2).unwrap().apply(&mut mo).unwrap();
        assert_eq!(mo.mapping().vm_location(vm(4)), Some(n(2)));
        Action::shutdown_vm(vm(4), n(2), 2, 3).unwrap().apply(&mut mo).unwrap();
        assert!(mo.mapping().is_ready(vm(4)));
        Action::kill_vm(vm(4), None, 3, 4).unwrap().apply(&mut mo).unwrap();
        assert!(!mo.mapping().contains_vm(vm(4)));

        assert_eq!(
            Action::forge_vm(vm(1), 0, 1).unwrap().apply(&mut mo),
            Err(ApplyError::AlreadyExists(vm(1)))
        );
    }

    #[test]
    fn migrate_requires_running_on_source() {
        let mut mo = model();
        let err = Action::migrate_vm(vm(1), n(2), n(1), 0, 5)
            .unwrap()
            .apply(&mut mo)
            .unwrap_err();
        assert_eq!(err, ApplyError::NotRunningOn { vm: vm(1), node: n(2) });

        Action::migrate_vm(vm(1), n(1), n(2), 0, 5)
            .unwrap()
            .apply(&mut mo)
            .unwrap();
        assert_eq!(mo.mapping().vm_location(vm(1)), Some(n(2)));
    }

    #[test]
    fn suspend_and_resume() {
        let mut mo = model();
        Action::resume_vm(vm(2), n(1), n(2), 0, 3)
            .unwrap()
            .apply(&mut mo)
            .unwrap();
        assert!(mo.mapping().is_running(vm(2)));
        Action::suspend_vm(vm(2), n(2), n(2), 3, 4)
            .unwrap()
            .apply(&mut mo)
            .unwrap();
        assert_eq!(mo.mapping().vm_state(vm(2)), Some(VmState::Sleeping(n(2))));
    }

    #[test]
    fn kill_checks_host() {
        let mut mo = model();
        let err = Action::kill_vm(vm(1), Some(n(2)), 0, 1)
            .unwrap()
            .apply(&mut mo)
            .unwrap_err();
        assert_eq!(err, ApplyError::NotHostedOn { vm: vm(1), node: n(2) });
        Action::kill_vm(vm(1), Some(n(1)), 0, 1)
            .unwrap()
            .apply(&mut mo)
            .unwrap();
        assert!(!mo.mapping().contains_vm(vm(1)));
    }

    #[test]
    fn allocate_updates_view() {
        let mut mo = model();
        Action::allocate(vm(1), n(1), "cpu", 5, 0, 1)
            .unwrap()
            .apply(&mut mo)
            .unwrap();
        assert_eq!(mo.resource("cpu").unwrap().get_consumption(vm(1)), 5);

        let err = Action::allocate(vm(1), n(1), "mem", 5, 0, 1)
            .unwrap()
            .apply(&mut mo)
            .unwrap_err();
        assert!(matches!(err, ApplyError::Model(_)));
    }

    #[test]
    fn hooked_events_run_around_the_transition() {
        let mut mo = model();
        let a = Action::boot_vm(vm(3), n(2), 0, 2)
            .unwrap()
            .with_event(Hook::Pre, Event::allocate(vm(3), "cpu", 2))
            .with_event(Hook::Post, Event::substituted_vm(vm(3), vm(30)));
        a.apply(&mut mo).unwrap();

        assert_eq!(mo.mapping().vm_location(vm(30)), Some(n(2)));
        assert_eq!(mo.resource("cpu").unwrap().get_consumption(vm(30)), 2);
    }

    #[test]
    fn failed_apply_leaves_model_untouched() {
        let mut mo = model();
        let before = mo.clone();
        let a = Action::boot_vm(vm(3), n(2), 0, 2)
            .unwrap()
            .with_event(Hook::Pre, Event::allocate(vm(3), "cpu", 2))
            .with_event(Hook::Post, Event::allocate(vm(3), "mem", 2));
        assert!(a.apply(&mut mo).is_err());
        assert_eq!(mo, before);
    }

    #[test]
    fn equality_is_structural() {
        let a = Action::boot_node(n(1), 0, 3).unwrap();
        let b = Action::boot_node(n(1), 0, 3).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Action::boot_node(n(1), 0, 4).unwrap());
        assert_ne!(
            a,
            b.clone().with_event(Hook::Post, Event::allocate(vm(1), "cpu", 1))
        );
        assert_ne!(
            Action::migrate_vm(vm(1), n(1), n(2), 0, 3).unwrap(),
            Action::migrate_vm(vm(1), n(1), n(2), 0, 3).unwrap().with_bandwidth(100)
        );
    }

    #[test]
    fn display() {
        let a = Action::migrate_vm(vm(1), n(1), n(2), 3, 5)
            .unwrap()
            .with_event(Hook::Pre, Event::allocate(vm(1), "cpu", 2));
        assert_eq!(
            a.to_string(),
            "3:5 {action=migrate(vm=vm1, from=n1, to=n2, bw=0), @pre= {allocate(vm=vm1, rc=cpu, amount=2)}}"
        );
    }

    #[test]
    fn serializes_roundtrip() {
        let a = Action::migrate_vm(vm(1), n(1), n(2), 3, 5)
            .unwrap()
            .with_bandwidth(40)
            .with_event(Hook::Pre, Event::allocate(vm(1), "cpu", 2))
            .with_event(Hook::Post, Event::substituted_vm(vm(1), vm(7)));
        let json = serde_json::to_string(&a).unwrap();
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn deserialize_rejects_inverted_interval() {
        let json = r#"{"start":5,"end":3,"kind":{"type":"boot_node","node":1}}"#;
        let err = serde_json::from_str::<Action>(json).unwrap_err();
        assert!(err.to_string().contains("start 5 is after end 3"));

        let ok = r#"{"start":3,"end":5,"kind":{"type":"boot_node","node":1}}"#;
        let a: Action = serde_json::from_str(ok).unwrap();
        assert_eq!(a, Action::boot_node(n(1), 3, 5).unwrap());
        assert_eq!(a.duration(), 2);
    }
}
