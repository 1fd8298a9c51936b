//! Dependency bookkeeping shared by computed signals and watches.
//!
//! After each tracked run the reaction hands the freshly collected sources to
//! [`Dependencies::reconcile`], which unsubscribes from sources no longer read
//! and subscribes to new ones. Sources still read keep their subscription.

use std::rc::Rc;

use indexmap::IndexMap;

use super::signal::{SignalId, Source};
use super::subscriber::SubscriberId;

/// The signals a reaction currently depends on.
#[derive(Default)]
pub(crate) struct Dependencies {
    subs: IndexMap<SignalId, (Rc<dyn Source>, SubscriberId)>,
}

impl Dependencies {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replace the dependency set with `tracked`.
    pub(crate) fn reconcile(&mut self, tracked: Vec<Rc<dyn Source>>, reaction: Rc<dyn Fn()>) {
        let mut next = IndexMap::with_capacity(tracked.len());
        for source in tracked {
            let id = source.id();
            match self.subs.shift_remove(&id) {
                Some(existing) => {
                    next.insert(id, existing);
                }
                None => {
                    let subscriber = source.subscribe_reaction(Rc::clone(&reaction));
                    next.insert(id, (source, subscriber));
                }
            }
        }

        for (_, (source, subscriber)) in self.subs.drain(..) {
            source.unsubscribe(subscriber);
        }
        self.subs = next;
    }

    /// Unsubscribe from everything.
    pub(crate) fn clear(&mut self) {
        for (_, (source, subscriber)) in self.subs.drain(..) {
            source.unsubscribe(subscriber);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.subs.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: SignalId) -> bool {
        self.subs.contains_key(&id)
    }
}

impl Drop for Dependencies {
    fn drop(&mut self) {
        self.clear();
    }
}
