//! Subscriber bookkeeping.
//!
//! Slice subscribers, slice-created listeners and observers are all stored in
//! small id-keyed lists. Registration hands back a [`Subscription`] whose
//! `unsubscribe` removes the entry again.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// An ordered list of listeners of type `F` (usually `dyn Fn(..)`).
pub(crate) struct Subscribers<F: ?Sized> {
    entries: RefCell<Vec<(SubscriberId, Rc<F>)>>,
}

impl<F: ?Sized + 'static> Subscribers<F> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn add(self: &Rc<Self>, listener: Rc<F>) -> Subscription {
        let id = SubscriberId::new();
        self.entries.borrow_mut().push((id, listener));
        let list: Weak<Self> = Rc::downgrade(self);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                list.remove(id);
            }
        })
    }

    fn remove(&self, id: SubscriberId) {
        self.entries.borrow_mut().retain(|(entry, _)| *entry != id);
    }

    /// Copy of the current listeners, so a listener may (un)subscribe while
    /// the list is being walked.
    pub(crate) fn snapshot(&self) -> Vec<Rc<F>> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Handle returned by every `subscribe`-style call.
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to end it.
#[must_use = "dropping a Subscription does not unsubscribe; keep it to call `unsubscribe`"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let list: Rc<Subscribers<dyn Fn()>> = Rc::new(Subscribers::new());
        let calls = Rc::new(Cell::new(0));

        let a = calls.clone();
        let first = list.add(Rc::new(move || a.set(a.get() + 1)));
        let b = calls.clone();
        let _second = list.add(Rc::new(move || b.set(b.get() + 10)));

        for listener in list.snapshot() {
            listener();
        }
        assert_eq!(calls.get(), 11);

        first.unsubscribe();
        assert_eq!(list.len(), 1);
        for listener in list.snapshot() {
            listener();
        }
        assert_eq!(calls.get(), 21);
    }
}
