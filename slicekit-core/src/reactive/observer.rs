//! Observers
//!
//! An observer is the bridge to a host that re-renders on change. The host
//! runs its read code inside [`Observer::track`]; every key read through a
//! [`TrackedState`](super::TrackedState) during that call is recorded. When a
//! slice commits, the runtime compares the recorded values against the new
//! state and calls the observer's `notify` only if one of them changed. The
//! host is expected to respond by tracking again.
//!
//! Dropping the observer ends the subscription.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::proxy::{ReadLog, SliceState};
use super::runtime::RuntimeInner;

pub(crate) struct ObserverInner {
    pub(crate) log: Rc<ReadLog>,
    notify: Box<dyn Fn()>,
}

pub struct Observer {
    inner: Rc<ObserverInner>,
    runtime: Weak<RuntimeInner>,
}

/// Restores the previously active binding.
struct BindingGuard<'a> {
    slot: &'a RefCell<Option<Rc<ObserverInner>>>,
    previous: Option<Rc<ObserverInner>>,
}

impl Drop for BindingGuard<'_> {
    fn drop(&mut self) {
        *self.slot.borrow_mut() = self.previous.take();
    }
}

impl Observer {
    pub(crate) fn new(runtime: &Rc<RuntimeInner>, notify: impl Fn() + 'static) -> Self {
        let inner = Rc::new(ObserverInner {
            log: Rc::new(ReadLog::default()),
            notify: Box::new(notify),
        });
        runtime.observers.borrow_mut().push(Rc::downgrade(&inner));
        Self {
            inner,
            runtime: Rc::downgrade(runtime),
        }
    }

    /// Run `f` with this observer as the active binding, replacing the
    /// previously recorded reads.
    pub fn track<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.log.clear();
        let Some(runtime) = self.runtime.upgrade() else {
            return f();
        };
        let previous = runtime.binding.replace(Some(self.inner.clone()));
        let _guard = BindingGuard {
            slot: &runtime.binding,
            previous,
        };
        f()
    }

    /// Number of distinct `(slice, key)` pairs recorded by the last `track`.
    pub fn tracked_reads(&self) -> usize {
        self.inner.log.len()
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("tracked_reads", &self.tracked_reads())
            .finish()
    }
}

impl RuntimeInner {
    /// Notify observers whose recorded reads of `slice` went stale.
    pub(crate) fn notify_observers(&self, slice: &str, state: &SliceState) {
        let observers: Vec<Rc<ObserverInner>> = {
            let mut list = self.observers.borrow_mut();
            list.retain(|observer| observer.strong_count() > 0);
            list.iter().filter_map(Weak::upgrade).collect()
        };
        for observer in observers {
            if observer.log.is_stale(slice, state) {
                (observer.notify)();
            }
        }
    }
}
