//! Reactive Runtime
//!
//! The runtime is the central coordinator. It owns the store, the slice
//! registry, the computation context and the microtask executor, and hands
//! out [`Take`] handles for registered slices.
//!
//! # How It Works
//!
//! 1. `create_slice` registers a node and queues its initialization behind
//!    every slice registered earlier.
//!
//! 2. Initialization binds the loop and runs it once. The first commit
//!    dispatches `initializeSlice::<name>` to the store.
//!
//! 3. A setter that changes a state cell marks the slice dirty and queues one
//!    flush; reads flush synchronously if they get there first.
//!
//! 4. Nothing queued runs until the host drives the executor with
//!    [`Runtime::run_until_stalled`] or [`Runtime::block_on`].
//!
//! # Threading
//!
//! Everything is single-threaded: the runtime is `!Send` and relies on
//! `Rc`/`RefCell` throughout.

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;

use super::context::ContextStack;
use super::exports::Exports;
use super::hooks::Hooks;
use super::observer::{Observer, ObserverInner};
use super::subscriber::{Subscribers, Subscription};
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::executor::Executor;
use crate::graph::{ready_creator, LoopFn, SliceNode};
use crate::store::{Action, Store};
use crate::take::Take;

pub(crate) type CreatedListener = dyn Fn(&Take);

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) store: RefCell<Store>,
    pub(crate) registry: RefCell<IndexMap<String, Rc<SliceNode>>>,
    pub(crate) contexts: ContextStack,
    pub(crate) executor: Executor,
    pub(crate) created: Rc<Subscribers<CreatedListener>>,
    pub(crate) observers: RefCell<Vec<Weak<ObserverInner>>>,
    /// Observer whose `track` call is currently on the stack.
    pub(crate) binding: RefCell<Option<Rc<ObserverInner>>>,
}

/// Handle to a slice runtime. Clones share the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let store = Store::new(config.action_log_capacity);
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                store: RefCell::new(store),
                registry: RefCell::new(IndexMap::new()),
                contexts: ContextStack::new(),
                executor: Executor::new(),
                created: Rc::new(Subscribers::new()),
                observers: RefCell::new(Vec::new()),
                binding: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Rc<RuntimeInner>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Register a slice whose loop is available immediately.
    ///
    /// The loop first runs once every previously registered slice is ready.
    pub fn create_slice<F>(&self, name: &str, looper: F) -> Result<Take>
    where
        F: Fn(&Hooks) -> Result<Exports> + 'static,
    {
        let looper: Rc<LoopFn> = Rc::new(looper);
        self.inner.register(name, ready_creator(looper))
    }

    /// Register a slice whose loop is produced asynchronously.
    ///
    /// `creator` is called once every previously registered slice is ready;
    /// slices registered afterwards wait for the returned future as well.
    pub fn create_slice_async<C, Fut, F>(&self, name: &str, creator: C) -> Result<Take>
    where
        C: FnOnce() -> Fut + 'static,
        Fut: Future<Output = F> + 'static,
        F: Fn(&Hooks) -> Result<Exports> + 'static,
    {
        self.inner.register(
            name,
            Box::new(move || {
                async move {
                    let looper: Rc<LoopFn> = Rc::new(creator().await);
                    looper
                }
                .boxed_local()
            }),
        )
    }

    /// Handle for an already registered slice.
    pub fn slice(&self, name: &str) -> Option<Take> {
        let node = self.inner.registry.borrow().get(name).cloned()?;
        Some(Take::new(self.inner.clone(), node))
    }

    pub fn slice_names(&self) -> Vec<String> {
        self.inner.registry.borrow().keys().cloned().collect()
    }

    /// Resolves once every slice registered *so far* has run for the first
    /// time. Slices registered later are not covered; re-check after
    /// [`Runtime::on_slice_created`] fires.
    pub fn when_all_ready(&self) -> impl Future<Output = ()> + 'static {
        self.inner.when_all_ready()
    }

    /// Called synchronously with every slice registered from now on.
    pub fn on_slice_created(&self, listener: impl Fn(&Take) + 'static) -> Subscription {
        let listener: Rc<CreatedListener> = Rc::new(listener);
        self.inner.created.add(listener)
    }

    /// Create an observer; see [`Observer`].
    pub fn observe(&self, notify: impl Fn() + 'static) -> Observer {
        Observer::new(&self.inner, notify)
    }

    /// Whether a slice computation is currently running.
    pub fn is_computing(&self) -> bool {
        self.inner.contexts.is_active()
    }

    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        self.inner.executor.spawn(task);
    }

    /// Drain the microtask queue. Returns `false` if called re-entrantly.
    pub fn run_until_stalled(&self) -> bool {
        self.inner.executor.run_until_stalled()
    }

    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        self.inner.executor.block_on(future)
    }

    /// The whole store as JSON.
    pub fn snapshot(&self) -> Value {
        self.inner.store.borrow().snapshot()
    }

    /// Logged store actions, oldest first.
    pub fn actions(&self) -> Vec<Action> {
        self.inner.store.borrow().actions().cloned().collect()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("slices", &self.slice_names())
            .field("computing", &self.is_computing())
            .finish()
    }
}
