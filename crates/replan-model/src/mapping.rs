//! Node states and VM placement.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use replan_core::{NodeId, VmId};

use crate::error::{ModelError, ModelResult};

/// Where a VM is and what it is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "node", rename_all = "snake_case")]
pub enum VmState {
    /// Known to the cluster but not placed anywhere.
    Ready,
    Running(NodeId),
    Sleeping(NodeId),
}

impl VmState {
    /// The hosting node, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            VmState::Ready => None,
            VmState::Running(n) | VmState::Sleeping(n) => Some(*n),
        }
    }
}

/// Placement of VMs on nodes.
///
/// A node is either online or offline; a VM is ready, running or sleeping.
/// Killed VMs are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    online: BTreeSet<NodeId>,
    offline: BTreeSet<NodeId>,
    vms: BTreeMap<VmId, VmState>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Nodes ─────────────────────────────────────────────────────

    /// Mark a node online. Unknown nodes are registered.
    pub fn add_online_node(&mut self, node: NodeId) {
        self.offline.remove(&node);
        self.online.insert(node);
        trace!(%node, "node online");
    }

    /// Mark a node offline. Fails while it hosts running or sleeping VMs.
    pub fn add_offline_node(&mut self, node: NodeId) -> ModelResult<()> {
        let count = self.hosted_count(node);
        if count > 0 {
            return Err(ModelError::NodeHostsVms { node, count });
        }
        self.online.remove(&node);
        self.offline.insert(node);
        trace!(%node, "node offline");
        Ok(())
    }

    /// Forget a node. Returns `false` if it was not known.
    pub fn remove_node(&mut self, node: NodeId) -> ModelResult<bool> {
        let count = self.hosted_count(node);
        if count > 0 {
            return Err(ModelError::NodeHostsVms { node, count });
        }
        Ok(self.online.remove(&node) | self.offline.remove(&node))
    }

    pub fn is_online(&self, node: NodeId) -> bool {
        self.online.contains(&node)
    }

    pub fn is_offline(&self, node: NodeId) -> bool {
        self.offline.contains(&node)
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.is_online(node) || self.is_offline(node)
    }

    pub fn online_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.online.iter().copied()
    }

    pub fn offline_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.offline.iter().copied()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.online.iter().chain(self.offline.iter()).copied()
    }

    // ── VMs ───────────────────────────────────────────────────────

    /// Mark a VM ready, detaching it from its host if it had one.
    pub fn add_ready_vm(&mut self, vm: VmId) {
        self.vms.insert(vm, VmState::Ready);
        trace!(%vm, "vm ready");
    }

    /// Run a VM on an online node.
    pub fn add_running_vm(&mut self, vm: VmId, node: NodeId) -> ModelResult<()> {
        if !self.is_online(node) {
            return Err(ModelError::NodeNotOnline(node));
        }
        self.vms.insert(vm, VmState::Running(node));
        trace!(%vm, %node, "vm running");
        Ok(())
    }

    /// Put a VM to sleep on an online node.
    pub fn add_sleeping_vm(&mut self, vm: VmId, node: NodeId) -> ModelResult<()> {
        if !self.is_online(node) {
            return Err(ModelError::NodeNotOnline(node));
        }
        self.vms.insert(vm, VmState::Sleeping(node));
        trace!(%vm, %node, "vm sleeping");
        Ok(())
    }

    /// Remove a VM from the mapping. Returns `false` if it was not known.
    pub fn remove_vm(&mut self, vm: VmId) -> bool {
        self.vms.remove(&vm).is_some()
    }

    /// Replace the identifier of a VM, keeping its state.
    pub fn substitute_vm(&mut self, vm: VmId, new_vm: VmId) -> ModelResult<()> {
        if vm == new_vm {
            return if self.contains_vm(vm) {
                Ok(())
            } else {
                Err(ModelError::UnknownVm(vm))
            };
        }
        if self.contains_vm(new_vm) {
            return Err(ModelError::VmExists(new_vm));
        }
        let state = self.vms.remove(&vm).ok_or(ModelError::UnknownVm(vm))?;
        self.vms.insert(new_vm, state);
        Ok(())
    }

    pub fn vm_state(&self, vm: VmId) -> Option<VmState> {
        self.vms.get(&vm).copied()
    }

    pub fn contains_vm(&self, vm: VmId) -> bool {
        self.vms.contains_key(&vm)
    }

    pub fn is_ready(&self, vm: VmId) -> bool {
        matches!(self.vm_state(vm), Some(VmState::Ready))
    }

    pub fn is_running(&self, vm: VmId) -> bool {
        matches!(self.vm_state(vm), Some(VmState::Running(_)))
    }

    pub fn is_sleeping(&self, vm: VmId) -> bool {
        matches!(self.vm_state(vm), Some(VmState::Sleeping(_)))
    }

    /// The node hosting a running or sleeping VM.
    pub fn vm_location(&self, vm: VmId) -> Option<NodeId> {
        self.vm_state(vm).and_then(|s| s.node())
    }

    pub fn running_vms(&self, node: NodeId) -> impl Iterator<Item = VmId> + '_ {
        self.vms
            .iter()
            .filter(move |(_, s)| **s == VmState::Running(node))
            .map(|(vm, _)| *vm)
    }

    pub fn sleeping_vms(&self, node: NodeId) -> impl Iterator<Item = VmId> + '_ {
        self.vms
            .iter()
            .filter(move |(_, s)| **s == VmState::Sleeping(node))
            .map(|(vm, _)| *vm)
    }

    pub fn ready_vms(&self) -> impl Iterator<Item = VmId> + '_ {
        self.vms
            .iter()
            .filter(|(_, s)| **s == VmState::Ready)
            .map(|(vm, _)| *vm)
    }

    pub fn all_vms(&self) -> impl Iterator<Item = VmId> + '_ {
        self.vms.keys().copied()
    }

    fn hosted_count(&self, node: NodeId) -> usize {
        self.vms.values().filter(|s| s.node() == Some(node)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u32) -> NodeId {
        NodeId(id)
    }

    fn vm(id: u32) -> VmId {
        VmId(id)
    }

    #[test]
    fn node_switches_between_online_and_offline() {
        let mut m = Mapping::new();
        m.add_offline_node(n(1)).unwrap();
        assert!(m.is_offline(n(1)));

        m.add_online_node(n(1));
        assert!(m.is_online(n(1)));
        assert!(!m.is_offline(n(1)));
        assert_eq!(m.all_nodes().count(), 1);
    }

    #[test]
    fn running_requires_online_node() {
        let mut m = Mapping::new();
        m.add_offline_node(n(1)).unwrap();
        assert_eq!(
            m.add_running_vm(vm(1), n(1)),
            Err(ModelError::NodeNotOnline(n(1)))
        );
        assert!(!m.contains_vm(vm(1)));
    }

    #[test]
    fn cannot_turn_off_a_hosting_node() {
        let mut m = Mapping::new();
        m.add_online_node(n(1));
        m.add_running_vm(vm(1), n(1)).unwrap();
        m.add_sleeping_vm(vm(2), n(1)).unwrap();

        let err = m.add_offline_node(n(1)).unwrap_err();
        assert_eq!(err, ModelError::NodeHostsVms { node: n(1), count: 2 });
        assert!(m.remove_node(n(1)).is_err());
    }

    #[test]
    fn vm_queries() {
        let mut m = Mapping::new();
        m.add_online_node(n(1));
        m.add_running_vm(vm(1), n(1)).unwrap();
        m.add_sleeping_vm(vm(2), n(1)).unwrap();
        m.add_ready_vm(vm(3));

        assert!(m.is_running(vm(1)));
        assert!(m.is_sleeping(vm(2)));
        assert!(m.is_ready(vm(3)));
        assert_eq!(m.vm_location(vm(1)), Some(n(1)));
        assert_eq!(m.vm_location(vm(3)), None);
        assert_eq!(m.running_vms(n(1)).collect::<Vec<_>>(), vec![vm(1)]);
        assert_eq!(m.sleeping_vms(n(1)).collect::<Vec<_>>(), vec![vm(2)]);
        assert_eq!(m.ready_vms().collect::<Vec<_>>(), vec![vm(3)]);
    }

    #[test]
    fn substitute_keeps_state() {
        let mut m = Mapping::new();
        m.add_online_node(n(1));
        m.add_running_vm(vm(1), n(1)).unwrap();

        m.substitute_vm(vm(1), vm(9)).unwrap();
        assert!(!m.contains_vm(vm(1)));
        assert_eq!(m.vm_state(vm(9)), Some(VmState::Running(n(1))));

        m.add_ready_vm(vm(2));
        assert_eq!(m.substitute_vm(vm(2), vm(9)), Err(ModelError::VmExists(vm(9))));
        assert_eq!(m.substitute_vm(vm(5), vm(6)), Err(ModelError::UnknownVm(vm(5))));
    }

    #[test]
    fn remove_vm_reports_presence() {
        let mut m = Mapping::new();
        m.add_ready_vm(vm(1));
        assert!(m.remove_vm(vm(1)));
        assert!(!m.remove_vm(vm(1)));
    }

    #[test]
    fn clones_are_independent() {
        let mut m = Mapping::new();
        m.add_online_node(n(1));
        let snapshot = m.clone();
        m.add_running_vm(vm(1), n(1)).unwrap();
        assert_ne!(m, snapshot);
        assert!(!snapshot.contains_vm(vm(1)));
    }
}
