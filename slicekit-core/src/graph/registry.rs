//! Slice Registry
//!
//! Registration is append-only and name-unique. Initialization is chained in
//! registration order: a slice's creator is only called once every slice
//! registered before it has settled its first run, and an async creator holds
//! up every slice registered after it until it resolves.

use std::future::Future;
use std::rc::Rc;

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use tracing::{debug, error, warn};

use super::node::{LoopFn, SliceNode};
use crate::error::{ConfigurationError, Result};
use crate::reactive::RuntimeInner;
use crate::take::Take;

/// Produces the loop once prior slices are ready.
pub(crate) type Creator = Box<dyn FnOnce() -> LocalBoxFuture<'static, Rc<LoopFn>>>;

fn validate_name(name: &str) -> Result<(), ConfigurationError> {
    if name.is_empty() || name.contains("::") || name.contains('|') {
        return Err(ConfigurationError::InvalidSliceName(name.to_string()));
    }
    Ok(())
}

impl RuntimeInner {
    pub(crate) fn register(self: &Rc<Self>, name: &str, creator: Creator) -> Result<Take> {
        validate_name(name)?;
        if self.registry.borrow().contains_key(name) {
            return Err(ConfigurationError::DuplicateSlice(name.to_string()).into());
        }

        // Captured before inserting, so the new slice waits on its
        // predecessors only.
        let predecessors = self.when_all_ready();
        let node = Rc::new(SliceNode::new(name));
        self.registry
            .borrow_mut()
            .insert(name.to_string(), node.clone());
        debug!(slice = %name, "slice registered");

        let runtime = Rc::downgrade(self);
        let target = node.clone();
        self.executor.spawn(async move {
            predecessors.await;
            let looper = creator().await;
            if let Some(runtime) = runtime.upgrade() {
                runtime.initialize(&target, looper);
            }
        });

        let take = Take::new(self.clone(), node);
        for listener in self.created.snapshot() {
            listener(&take);
        }
        Ok(take)
    }

    fn initialize(self: &Rc<Self>, node: &Rc<SliceNode>, looper: Rc<LoopFn>) {
        if node.looper.set(looper).is_err() {
            warn!(slice = %node.name, "slice loop bound twice; keeping the first");
            return;
        }
        node.ready.set(true);
        if let Err(err) = self.run_loop(node) {
            error!(slice = %node.name, error = %err, "first run could not start");
        }
        node.settled.send_replace(true);
        debug!(slice = %node.name, initialized = node.initialized.get(), "slice settled");
    }

    /// Resolves once every slice registered so far has settled.
    pub(crate) fn when_all_ready(&self) -> impl Future<Output = ()> + 'static {
        let receivers: Vec<_> = self
            .registry
            .borrow()
            .values()
            .map(|node| node.settled.subscribe())
            .collect();
        future::join_all(receivers.into_iter().map(|mut settled| async move {
            // A dropped sender means the slice is gone; nothing to wait for.
            let _ = settled.wait_for(|done| *done).await;
        }))
        .map(|_| ())
    }
}

/// Wrap a synchronous loop as a creator.
pub(crate) fn ready_creator(looper: Rc<LoopFn>) -> Creator {
    Box::new(move || future::ready(looper).boxed_local())
}
