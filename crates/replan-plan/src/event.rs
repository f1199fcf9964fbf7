//! Instantaneous model mutations, standalone or hooked to an action.

use std::fmt;

use serde::{Deserialize, Serialize};

use replan_core::VmId;
use replan_model::Model;

use crate::error::ApplyError;

/// When an attached event is applied relative to its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    /// Before the action's own state transition.
    Pre,
    /// After the action's own state transition.
    Post,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Pre => write!(f, "pre"),
            Hook::Post => write!(f, "post"),
        }
    }
}

/// Smallest unit of model mutation.
///
/// Applying an event twice is not guaranteed to be harmless; callers apply
/// each committed event exactly once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Set the consumption of `vm` on the `resource` view to `amount`.
    Allocate {
        vm: VmId,
        resource: String,
        amount: u32,
    },
    /// `vm` is known as `new_vm` from now on.
    SubstitutedVm { vm: VmId, new_vm: VmId },
}

impl Event {
    pub fn allocate(vm: VmId, resource: &str, amount: u32) -> Self {
        Event::Allocate {
            vm,
            resource: resource.to_string(),
            amount,
        }
    }

    pub fn substituted_vm(vm: VmId, new_vm: VmId) -> Self {
        Event::SubstitutedVm { vm, new_vm }
    }

    /// The VM the event is about.
    pub fn vm(&self) -> VmId {
        match self {
            Event::Allocate { vm, .. } | Event::SubstitutedVm { vm, .. } => *vm,
        }
    }

    pub fn apply(&self, mo: &mut Model) -> Result<(), ApplyError> {
        match self {
            Event::Allocate {
                vm,
                resource,
                amount,
            } => {
                mo.resource_mut(resource)?.set_consumption(*vm, *amount);
                Ok(())
            }
            Event::SubstitutedVm { vm, new_vm } => Ok(mo.substitute_vm(*vm, *new_vm)?),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Allocate {
                vm,
                resource,
                amount,
            } => write!(f, "allocate(vm={vm}, rc={resource}, amount={amount})"),
            Event::SubstitutedVm { vm, new_vm } => write!(f, "substitute(vm={vm}, as={new_vm})"),
        }
    }
}
