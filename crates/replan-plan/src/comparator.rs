//! Ordering of actions along the timeline.

use std::cmp::Ordering;

use crate::action::Action;

/// Which end of an action's interval is compared first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// Compares actions by one bound, falling back to the other one on a tie.
///
/// Without differentiation, two different actions sharing both bounds
/// compare `Equal`. That is fine for sorting but loses actions in
/// ordered containers, so the differentiating variant breaks the
/// remaining tie with the structural order of the actions. Only equal
/// actions then compare `Equal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeComparator {
    bound: Bound,
    differentiate: bool,
}

impl TimeComparator {
    pub const fn new(bound: Bound, differentiate: bool) -> Self {
        Self {
            bound,
            differentiate,
        }
    }

    /// Start ascending, then end. Differentiating.
    pub const fn starts() -> Self {
        Self::new(Bound::Start, true)
    }

    /// End ascending, then start. Differentiating.
    pub const fn ends() -> Self {
        Self::new(Bound::End, true)
    }

    pub fn compare(&self, a: &Action, b: &Action) -> Ordering {
        let by_bounds = match self.bound {
            Bound::Start => a
                .start()
                .cmp(&b.start())
                .then_with(|| a.end().cmp(&b.end())),
            Bound::End => a
                .end()
                .cmp(&b.end())
                .then_with(|| a.start().cmp(&b.start())),
        };
        if self.differentiate {
            by_bounds.then_with(|| a.cmp(b))
        } else {
            by_bounds
        }
    }
}
