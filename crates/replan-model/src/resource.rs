//! Shareable resource views (CPU shares, memory, bandwidth...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use replan_core::{NodeId, VmId};

/// A named resource: how much each VM consumes and how much each node offers.
///
/// Elements without an explicit value read as the view's default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareableResource {
    id: String,
    default_consumption: u32,
    default_capacity: u32,
    consumption: BTreeMap<VmId, u32>,
    capacity: BTreeMap<NodeId, u32>,
}

impl ShareableResource {
    /// A view where undefined elements read as `0`.
    pub fn new(id: &str) -> Self {
        Self::with_defaults(id, 0, 0)
    }

    pub fn with_defaults(id: &str, default_consumption: u32, default_capacity: u32) -> Self {
        Self {
            id: id.to_string(),
            default_consumption,
            default_capacity,
            consumption: BTreeMap::new(),
            capacity: BTreeMap::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.id
    }

    pub fn get_consumption(&self, vm: VmId) -> u32 {
        self.consumption
            .get(&vm)
            .copied()
            .unwrap_or(self.default_consumption)
    }

    pub fn set_consumption(&mut self, vm: VmId, amount: u32) -> &mut Self {
        self.consumption.insert(vm, amount);
        self
    }

    pub fn unset_consumption(&mut self, vm: VmId) -> bool {
        self.consumption.remove(&vm).is_some()
    }

    pub fn consumption_defined(&self, vm: VmId) -> bool {
        self.consumption.contains_key(&vm)
    }

    pub fn get_capacity(&self, node: NodeId) -> u32 {
        self.capacity
            .get(&node)
            .copied()
            .unwrap_or(self.default_capacity)
    }

    pub fn set_capacity(&mut self, node: NodeId, amount: u32) -> &mut Self {
        self.capacity.insert(node, amount);
        self
    }

    /// Total consumption of a set of VMs, undefined ones counting as the default.
    pub fn sum_consumption<I>(&self, vms: I) -> u64
    where
        I: IntoIterator<Item = VmId>,
    {
        vms.into_iter()
            .map(|vm| u64::from(self.get_consumption(vm)))
            .sum()
    }

    /// Move the consumption recorded for `vm` to `new_vm`.
    pub fn substitute_vm(&mut self, vm: VmId, new_vm: VmId) {
        if let Some(amount) = self.consumption.remove(&vm) {
            self.consumption.insert(new_vm, amount);
        }
    }
}
