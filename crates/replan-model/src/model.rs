//! The cluster snapshot: a mapping plus named resource views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use replan_core::VmId;

use crate::error::{ModelError, ModelResult};
use crate::mapping::Mapping;
use crate::resource::ShareableResource;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    mapping: Mapping,
    views: BTreeMap<String, ShareableResource>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mapping: Mapping) -> Self {
        Self {
            mapping,
            views: BTreeMap::new(),
        }
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn mapping_mut(&mut self) -> &mut Mapping {
        &mut self.mapping
    }

    /// Attach a resource view. Returns `false` if a view with the same
    /// identifier is already attached.
    pub fn attach(&mut self, view: ShareableResource) -> bool {
        if self.views.contains_key(view.identifier()) {
            return false;
        }
        self.views.insert(view.identifier().to_string(), view);
        true
    }

    pub fn detach(&mut self, id: &str) -> Option<ShareableResource> {
        self.views.remove(id)
    }

    pub fn resource(&self, id: &str) -> Option<&ShareableResource> {
        self.views.get(id)
    }

    pub fn resource_mut(&mut self, id: &str) -> ModelResult<&mut ShareableResource> {
        self.views
            .get_mut(id)
            .ok_or_else(|| ModelError::UnknownResource(id.to_string()))
    }

    pub fn resources(&self) -> impl Iterator<Item = &ShareableResource> {
        self.views.values()
    }

    /// Rename a VM in the mapping and in every attached view.
    pub fn substitute_vm(&mut self, vm: VmId, new_vm: VmId) -> ModelResult<()> {
        self.mapping.substitute_vm(vm, new_vm)?;
        for view in self.views.values_mut() {
            view.substitute_vm(vm, new_vm);
        }
        debug!(%vm, %new_vm, "vm substituted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replan_core::NodeId;

    #[test]
    fn attach_rejects_duplicates() {
        let mut mo = Model::new();
        assert!(mo.attach(ShareableResource::new("cpu")));
        assert!(!mo.attach(ShareableResource::new("cpu")));
        assert!(mo.resource("cpu").is_some());
        assert!(mo.detach("cpu").is_some());
        assert!(mo.resource("cpu").is_none());
    }

    #[test]
    fn unknown_view_is_an_error() {
        let mut mo = Model::new();
        assert_eq!(
            mo.resource_mut("mem").unwrap_err(),
            ModelError::UnknownResource("mem".to_string())
        );
    }

    #[test]
    fn substitute_reaches_views() {
        let mut mo = Model::new();
        mo.mapping_mut().add_online_node(NodeId(1));
        mo.mapping_mut().add_running_vm(VmId(1), NodeId(1)).unwrap();
        let mut cpu = ShareableResource::new("cpu");
        cpu.set_consumption(VmId(1), 4);
        mo.attach(cpu);

        mo.substitute_vm(VmId(1), VmId(2)).unwrap();
        assert!(mo.mapping().is_running(VmId(2)));
        assert_eq!(mo.resource("cpu").unwrap().get_consumption(VmId(2)), 4);
    }

    #[test]
    fn clone_is_structurally_equal() {
        let mut mo = Model::new();
        mo.mapping_mut().add_online_node(NodeId(1));
        mo.attach(ShareableResource::new("cpu"));
        assert_eq!(mo.clone(), mo);
    }

    #[test]
    fn serializes_roundtrip() {
        let mut mo = Model::new();
        mo.mapping_mut().add_online_node(NodeId(1));
        mo.mapping_mut().add_offline_node(NodeId(2)).unwrap();
        mo.mapping_mut().add_running_vm(VmId(1), NodeId(1)).unwrap();
        mo.mapping_mut().add_sleeping_vm(VmId(2), NodeId(1)).unwrap();
        mo.mapping_mut().add_ready_vm(VmId(3));
        let mut cpu = ShareableResource::new("cpu");
        cpu.set_consumption(VmId(1), 2).set_capacity(NodeId(1), 8);
        mo.attach(cpu);

        let json = serde_json::to_string(&mo).unwrap();
        let back: Model = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mo);
    }
}
