//! Moment-by-moment traversal of a plan's start and end events.

use std::collections::VecDeque;

use replan_core::Moment;

use crate::action::Action;
use crate::comparator::TimeComparator;

/// One notification of the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    Start(&'a Action),
    End(&'a Action),
}

impl<'a> Step<'a> {
    pub fn action(&self) -> &'a Action {
        match self {
            Step::Start(a) | Step::End(a) => a,
        }
    }
}

/// Order the starts and ends of `actions` along the timeline.
///
/// At each moment `t`, every action ending at `t` is reported before any
/// action starting at `t`, so capacity released at `t` is visible to the
/// actions claiming it at `t`. An instantaneous action at `t` is reported
/// with the ending ones, its start immediately followed by its end.
pub fn steps(actions: &[Action]) -> Vec<Step<'_>> {
    let mut starts: Vec<usize> = (0..actions.len()).collect();
    let mut ends = starts.clone();
    let by_start = TimeComparator::starts();
    let by_end = TimeComparator::ends();
    starts.sort_by(|a, b| by_start.compare(&actions[*a], &actions[*b]));
    ends.sort_by(|a, b| by_end.compare(&actions[*a], &actions[*b]));

    let mut starts = VecDeque::from(starts);
    let mut ends = VecDeque::from(ends);
    let mut started = vec![false; actions.len()];
    let mut out = Vec::with_capacity(actions.len() * 2);

    while let Some(now) = next_moment(actions, &starts, &ends) {
        while let Some(&i) = ends.front() {
            if actions[i].end() != now {
                break;
            }
            ends.pop_front();
            if !started[i] {
                started[i] = true;
                out.push(Step::Start(&actions[i]));
            }
            out.push(Step::End(&actions[i]));
        }
        while let Some(&i) = starts.front() {
            if actions[i].start() != now {
                break;
            }
            starts.pop_front();
            if !started[i] {
                started[i] = true;
                out.push(Step::Start(&actions[i]));
            }
        }
    }
    out
}

fn next_moment(actions: &[Action], starts: &VecDeque<usize>, ends: &VecDeque<usize>) -> Option<Moment> {
    let s = starts.front().map(|i| actions[*i].start());
    let e = ends.front().map(|i| actions[*i].end());
    match (s, e) {
        (Some(s), Some(e)) => Some(s.min(e)),
        (s, e) => s.or(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replan_core::{NodeId, VmId};

    fn labels(steps: &[Step<'_>]) -> Vec<String> {
        steps
            .iter()
            .map(|s| match s {
                Step::Start(a) => format!("+{}", a.kind()),
                Step::End(a) => format!("-{}", a.kind()),
            })
            .collect()
    }

    #[test]
    fn ends_before_starts_at_same_moment() {
        let free = Action::shutdown_vm(VmId(1), NodeId(1), 0, 3).unwrap();
        let claim = Action::boot_vm(VmId(2), NodeId(1), 3, 5).unwrap();
        let actions = vec![claim, free];

        assert_eq!(
            labels(&steps(&actions)),
            vec![
                "+shutdown(vm=vm1, on=n1)",
                "-shutdown(vm=vm1, on=n1)",
                "+boot(vm=vm2, on=n1)",
                "-boot(vm=vm2, on=n1)",
            ]
        );
    }

    #[test]
    fn overlapping_actions_interleave() {
        let a = Action::boot_node(NodeId(1), 0, 4).unwrap();
        let b = Action::boot_node(NodeId(2), 1, 2).unwrap();
        let actions = vec![a, b];
        assert_eq!(
            labels(&steps(&actions)),
            vec![
                "+boot_node(node=n1)",
                "+boot_node(node=n2)",
                "-boot_node(node=n2)",
                "-boot_node(node=n1)",
            ]
        );
    }

    #[test]
    fn instantaneous_action_starts_before_it_ends() {
        let running = Action::boot_node(NodeId(1), 0, 2).unwrap();
        let instant = Action::forge_vm(VmId(1), 2, 2).unwrap();
        let next = Action::boot_node(NodeId(2), 2, 3).unwrap();
        let actions = vec![next, instant, running];

        assert_eq!(
            labels(&steps(&actions)),
            vec![
                "+boot_node(node=n1)",
                "-boot_node(node=n1)",
                "+forge(vm=vm1)",
                "-forge(vm=vm1)",
                "+boot_node(node=n2)",
                "-boot_node(node=n2)",
            ]
        );
    }

    #[test]
    fn simultaneous_actions_are_all_reported() {
        let actions = vec![
            Action::boot_node(NodeId(1), 0, 1).unwrap(),
            Action::boot_node(NodeId(2), 0, 1).unwrap(),
            Action::boot_node(NodeId(3), 0, 1).unwrap(),
        ];
        assert_eq!(steps(&actions).len(), 6);
    }

    #[test]
    fn empty_plan_has_no_step() {
        assert!(steps(&[]).is_empty());
    }
}
