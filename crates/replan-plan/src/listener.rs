//! Notifications fired after an action has been committed.

use std::fmt;
use std::sync::Arc;

use crate::action::Action;
use crate::event::{Event, Hook};

/// Observer of successful commits.
///
/// For one committed action the callbacks arrive as: every `Pre` event,
/// the action itself, every `Post` event.
pub trait EventCommittedListener: Send + Sync {
    fn committed_event(&self, _hook: Hook, _event: &Event) {}

    fn committed_action(&self, action: &Action);
}

/// The listeners registered on an applier.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Vec<Arc<dyn EventCommittedListener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn EventCommittedListener>) {
        self.inner.push(listener);
    }

    /// Remove a listener, compared by identity. Returns `false` if absent.
    pub fn remove(&mut self, listener: &Arc<dyn EventCommittedListener>) -> bool {
        let before = self.inner.len();
        self.inner.retain(|l| !Arc::ptr_eq(l, listener));
        self.inner.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn notify(&self, action: &Action) {
        for l in &self.inner {
            for e in action.events(Hook::Pre) {
                l.committed_event(Hook::Pre, e);
            }
            l.committed_action(action);
            for e in action.events(Hook::Post) {
                l.committed_event(Hook::Post, e);
            }
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.inner.len())
            .finish()
    }
}
