//! Precedence extraction between the actions of a plan.
//!
//! Actions are sorted into two buckets per node:
//!
//! - **freeing**: the action releases capacity on the node (booting it,
//!   or moving, stopping, suspending or killing a VM hosted there, or
//!   lowering an allocation);
//! - **demanding**: the action consumes capacity on the node (booting,
//!   resuming or migrating a VM onto it, raising an allocation, or shutting
//!   the node down, which has to wait for its VMs to leave).
//!
//! A demanding action depends on every freeing action of the same node
//! that ends no later than it starts. Only resource contention is
//! captured; this is not a general ordering graph.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use replan_core::NodeId;
use replan_model::Model;

use crate::action::{Action, ActionKind};

/// The actions (by position in the plan) that must commit before `action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    action: usize,
    blockers: BTreeSet<usize>,
}

impl Dependency {
    pub fn action(&self) -> usize {
        self.action
    }

    pub fn blockers(&self) -> &BTreeSet<usize> {
        &self.blockers
    }

    pub fn is_free(&self) -> bool {
        self.blockers.is_empty()
    }
}

/// Single-pass classifier of actions into freeing/demanding node buckets.
#[derive(Debug)]
pub struct DependenciesExtractor<'a> {
    origin: &'a Model,
    actions: Vec<&'a Action>,
    freeing: HashMap<NodeId, Vec<usize>>,
    demanding: HashMap<NodeId, Vec<usize>>,
    demanded_node: HashMap<usize, NodeId>,
}

impl<'a> DependenciesExtractor<'a> {
    /// Allocations are classified against the consumption recorded in `origin`.
    pub fn new(origin: &'a Model) -> Self {
        Self {
            origin,
            actions: Vec::new(),
            freeing: HashMap::new(),
            demanding: HashMap::new(),
            demanded_node: HashMap::new(),
        }
    }

    /// Classify every action of `actions` and return one [`Dependency`] per
    /// action, in the same order.
    pub fn extract(origin: &'a Model, actions: &'a [Action]) -> Vec<Dependency> {
        let mut ex = Self::new(origin);
        for a in actions {
            ex.register(a);
        }
        let deps: Vec<Dependency> = (0..actions.len())
            .map(|pos| Dependency {
                action: pos,
                blockers: ex.blockers_of(pos),
            })
            .collect();
        debug!(
            actions = actions.len(),
            edges = deps.iter().map(|d| d.blockers.len()).sum::<usize>(),
            "dependencies extracted"
        );
        deps
    }

    /// Register an action. Returns `false` if it could not be classified
    /// (an allocation on a resource view the origin does not have); such an
    /// action gets no dependency and fails later, when applied.
    pub fn register(&mut self, action: &'a Action) -> bool {
        let pos = self.actions.len();
        self.actions.push(action);
        match action.kind() {
            ActionKind::BootNode { node } => self.freeing(*node, pos),
            ActionKind::ShutdownNode { node } => self.demanding(*node, pos),
            ActionKind::ForgeVm { .. } => {}
            ActionKind::BootVm { node, .. } => self.demanding(*node, pos),
            ActionKind::ShutdownVm { node, .. } => self.freeing(*node, pos),
            ActionKind::MigrateVm { src, dst, .. } => {
                self.freeing(*src, pos);
                self.demanding(*dst, pos);
            }
            ActionKind::SuspendVm { src, .. } => self.freeing(*src, pos),
            ActionKind::ResumeVm { dst, .. } => self.demanding(*dst, pos),
            ActionKind::KillVm { node, .. } => {
                if let Some(node) = node {
                    self.freeing(*node, pos);
                }
            }
            ActionKind::Allocate {
                vm,
                node,
                resource,
                amount,
            } => {
                let Some(rc) = self.origin.resource(resource) else {
                    warn!(%action, resource = %resource, "unknown resource view, no dependency recorded");
                    return false;
                };
                if *amount > rc.get_consumption(*vm) {
                    self.demanding(*node, pos);
                } else {
                    self.freeing(*node, pos);
                }
            }
        }
        true
    }

    /// The registered actions that must commit before `action`.
    pub fn dependencies(&self, action: &Action) -> Vec<&'a Action> {
        let Some(pos) = self.actions.iter().position(|a| *a == action) else {
            return Vec::new();
        };
        self.blockers_of(pos)
            .into_iter()
            .map(|p| self.actions[p])
            .collect()
    }

    /// Actions registered as freeing capacity on `node`.
    pub fn freeing_on(&self, node: NodeId) -> Vec<&'a Action> {
        self.bucket(&self.freeing, node)
    }

    /// Actions registered as demanding capacity on `node`.
    pub fn demanding_on(&self, node: NodeId) -> Vec<&'a Action> {
        self.bucket(&self.demanding, node)
    }

    fn bucket(&self, buckets: &HashMap<NodeId, Vec<usize>>, node: NodeId) -> Vec<&'a Action> {
        buckets
            .get(&node)
            .map(|v| v.iter().map(|p| self.actions[*p]).collect())
            .unwrap_or_default()
    }

    fn freeing(&mut self, node: NodeId, pos: usize) {
        self.freeing.entry(node).or_default().push(pos);
    }

    fn demanding(&mut self, node: NodeId, pos: usize) {
        self.demanding.entry(node).or_default().push(pos);
        self.demanded_node.insert(pos, node);
    }

    fn blockers_of(&self, pos: usize) -> BTreeSet<usize> {
        let Some(node) = self.demanded_node.get(&pos) else {
            return BTreeSet::new();
        };
        let a = self.actions[pos];
        self.freeing
            .get(node)
            .into_iter()
            .flatten()
            .copied()
            .filter(|&p| {
                let other = self.actions[p];
                p != pos && other != a && other.end() <= a.start()
            })
            .collect()
    }
}
