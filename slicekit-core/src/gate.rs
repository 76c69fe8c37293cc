//! Readiness Gate
//!
//! Tracks whether every registered slice has settled its first run, including
//! slices registered after the gate was attached. Each registration starts a
//! new *generation*; only the wait started by the latest generation may flip
//! the gate open, so a slow wait from an older generation cannot open it
//! while a newer slice is still initializing.
//!
//! In dynamic mode a new registration closes an already open gate until the
//! new slice has settled. Otherwise the gate stays open once it has opened.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};

use tokio::sync::watch;
use tracing::debug;

use crate::reactive::{Runtime, Subscription};

struct GateInner {
    runtime: Runtime,
    dynamic: bool,
    generation: Cell<u64>,
    open: watch::Sender<bool>,
    created: RefCell<Option<Subscription>>,
}

impl GateInner {
    fn validate(self: &Rc<Self>) {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        if self.dynamic && *self.open.borrow() {
            self.open.send_replace(false);
            debug!(generation, "readiness gate closed for new slice");
        }

        let all_ready = self.runtime.when_all_ready();
        let gate: Weak<Self> = Rc::downgrade(self);
        self.runtime.spawn(async move {
            all_ready.await;
            let Some(gate) = gate.upgrade() else {
                return;
            };
            if gate.generation.get() == generation && !*gate.open.borrow() {
                gate.open.send_replace(true);
                debug!(generation, "readiness gate opened");
            }
        });
    }
}

/// Open once every slice registered on the runtime has run for the first
/// time.
pub struct ReadinessGate {
    inner: Rc<GateInner>,
}

impl ReadinessGate {
    pub fn attach(runtime: &Runtime, dynamic: bool) -> Self {
        let (open, _) = watch::channel(false);
        let inner = Rc::new(GateInner {
            runtime: runtime.clone(),
            dynamic,
            generation: Cell::new(0),
            open,
            created: RefCell::new(None),
        });

        inner.validate();
        let gate = Rc::downgrade(&inner);
        let subscription = runtime.on_slice_created(move |_| {
            if let Some(gate) = gate.upgrade() {
                gate.validate();
            }
        });
        *inner.created.borrow_mut() = Some(subscription);
        Self { inner }
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.open.borrow()
    }

    /// Resolves the next time the gate is open.
    pub fn ready(&self) -> impl Future<Output = ()> + 'static {
        let mut open = self.inner.open.subscribe();
        async move {
            let _ = open.wait_for(|open| *open).await;
        }
    }

    /// Stop following new registrations. The current state is kept.
    pub fn detach(self) {
        if let Some(subscription) = self.inner.created.borrow_mut().take() {
            subscription.unsubscribe();
        }
    }
}

impl std::fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("ready", &self.is_ready())
            .field("dynamic", &self.inner.dynamic)
            .field("generation", &self.inner.generation.get())
            .finish()
    }
}
