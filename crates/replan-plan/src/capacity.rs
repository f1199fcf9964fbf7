//! Cumulated running capacity: a bound on the VMs running on a node set.

use std::collections::BTreeSet;

use tracing::trace;

use replan_core::NodeId;
use replan_model::Model;

use crate::action::{Action, ActionKind};
use crate::checker::ConstraintChecker;

/// At most `max` VMs run on `nodes` at any moment.
///
/// A VM arriving on the set is counted from the start of its action, a VM
/// leaving the set is released at the end of its action.
#[derive(Debug, Clone)]
pub struct RunningCapacity {
    name: String,
    nodes: BTreeSet<NodeId>,
    max: usize,
    current: usize,
}

impl RunningCapacity {
    pub fn new<I>(nodes: I, max: usize) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        let nodes: BTreeSet<NodeId> = nodes.into_iter().collect();
        let name = format!(
            "running-capacity({}, {max})",
            nodes
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        Self {
            name,
            nodes,
            max,
            current: 0,
        }
    }

    fn running(&self, mo: &Model) -> usize {
        self.nodes
            .iter()
            .map(|n| mo.mapping().running_vms(*n).count())
            .sum()
    }

    fn inside(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }
}

impl ConstraintChecker for RunningCapacity {
    fn name(&self) -> &str {
        &self.name
    }

    fn starts_with(&mut self, origin: &Model) -> bool {
        self.current = self.running(origin);
        self.current <= self.max
    }

    fn start(&mut self, action: &Action) -> bool {
        let arrives = match action.kind() {
            ActionKind::BootVm { node, .. } => self.inside(node),
            ActionKind::ResumeVm { dst, .. } => self.inside(dst),
            ActionKind::MigrateVm { src, dst, .. } => self.inside(dst) && !self.inside(src),
            _ => false,
        };
        if arrives {
            self.current += 1;
            trace!(constraint = %self.name, current = self.current, "vm arriving");
        }
        self.current <= self.max
    }

    fn end(&mut self, action: &Action) -> bool {
        let leaves = match action.kind() {
            ActionKind::ShutdownVm { node, .. } => self.inside(node),
            ActionKind::SuspendVm { src, .. } => self.inside(src),
            ActionKind::MigrateVm { src, dst, .. } => self.inside(src) && !self.inside(dst),
            ActionKind::KillVm { node: Some(n), .. } => self.inside(n),
            _ => false,
        };
        if leaves {
            self.current = self.current.saturating_sub(1);
        }
        true
    }

    fn ends_with(&mut self, result: &Model) -> bool {
        self.running(result) <= self.max
    }
}
