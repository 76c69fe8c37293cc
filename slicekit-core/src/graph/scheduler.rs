//! Dirty/Flush Scheduler
//!
//! Each slice moves through
//!
//! ```text
//! clean --(state cell changed)--> dirty --(microtask)--> running --> clean
//! ```
//!
//! At most one flush task per slice is queued at a time. Further marks only
//! extend the trace, and the queued task clears `scheduled` before it
//! flushes. A read of a dirty slice flushes it synchronously, so the queued
//! task usually finds nothing left to do.
//!
//! A run re-invokes the loop with the slot cursor at zero, splits the exports
//! into plain state and callbacks, dispatches one action to the store, and
//! then notifies, in order: pre-commit dependents, subscribers, observers.
//! Effects staged by the run are drained in a separate task afterwards.

use std::rc::Rc;

use tracing::{debug, error, info, warn};

use super::node::SliceNode;
use crate::error::{Error, Result};
use crate::reactive::{Exports, Hooks, RuntimeInner, SliceState};
use crate::store::{Action, ActionType, Phase};

impl RuntimeInner {
    /// Mark `node` dirty because of `from`, queueing a flush if none is
    /// pending.
    pub(crate) fn set_dirty(self: &Rc<Self>, node: &Rc<SliceNode>, from: String) {
        if !node.ready.get() {
            warn!(slice = %node.name, %from, "ignoring dirty mark on a slice that is not ready");
            return;
        }
        node.froms.borrow_mut().push(from);
        node.dirty.set(true);
        if node.scheduled.replace(true) {
            return;
        }

        debug!(slice = %node.name, "flush scheduled");
        let runtime = Rc::downgrade(self);
        let target = Rc::downgrade(node);
        self.executor.spawn(async move {
            let (Some(runtime), Some(node)) = (runtime.upgrade(), target.upgrade()) else {
                return;
            };
            node.scheduled.set(false);
            if let Err(err) = runtime.flush(&node) {
                error!(slice = %node.name, error = %err, "scheduled flush failed");
            }
        });
    }

    /// Re-run `node` now if it is dirty.
    pub(crate) fn flush(self: &Rc<Self>, node: &Rc<SliceNode>) -> Result<()> {
        if !node.ready.get() {
            return Err(Error::NotReady(node.name.clone()));
        }
        if node.dirty.replace(false) {
            if let Err(err) = self.run_loop(node) {
                // The loop never started; leave the queued flush to retry.
                node.dirty.set(true);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Invoke the loop and commit its exports.
    ///
    /// Only failures to *enter* the computation are returned. A loop that
    /// fails is logged and nothing is committed.
    pub(crate) fn run_loop(self: &Rc<Self>, node: &Rc<SliceNode>) -> Result<()> {
        let looper = node
            .looper
            .get()
            .cloned()
            .ok_or_else(|| Error::NotReady(node.name.clone()))?;

        let guard = self.contexts.enter(node.clone())?;
        // Marks made while the loop runs belong to the flush they schedule.
        let trace: Vec<String> = node.froms.borrow_mut().drain(..).collect();
        node.cursor.set(0);
        node.runs.set(node.runs.get() + 1);
        let hooks = Hooks::new(Rc::downgrade(self), node.clone());
        let outcome = looper(&hooks).and_then(|exports| {
            node.verify_hook_count()?;
            Ok(exports)
        });
        drop(guard);

        match outcome {
            Ok(exports) => {
                if let Err(err) = self.commit(node, exports, trace) {
                    error!(slice = %node.name, error = %err, "commit failed");
                }
            }
            Err(err) => {
                node.staged_effects.borrow_mut().clear();
                error!(slice = %node.name, error = %err, "slice computation failed; keeping last committed state");
            }
        }
        Ok(())
    }

    fn commit(self: &Rc<Self>, node: &Rc<SliceNode>, exports: Exports, trace: Vec<String>) -> Result<()> {
        let (plain, callbacks) = exports.partition();
        let phase = if node.initialized.get() {
            Phase::SetState
        } else {
            Phase::InitializeSlice
        };
        let mut action_type = ActionType::new(phase, node.name.clone());
        if self.config.trace_actions {
            action_type = action_type.with_trace(trace);
        }

        let action = Action::slice(&action_type, plain);
        self.store.borrow_mut().dispatch(action)?;
        *node.callbacks.borrow_mut() = Rc::new(callbacks);
        node.initialized.set(true);

        if self.config.log_commits {
            info!(slice = %node.name, action = %action_type, "commit");
        } else {
            debug!(slice = %node.name, action = %action_type, "commit");
        }

        let state = self.whole_state(node)?;
        self.notify_dependents(node);
        self.notify_subscribers(node, &state);
        self.notify_observers(&node.name, &state);

        if node.promote_staged_effects() {
            let target = Rc::downgrade(node);
            self.executor.spawn(async move {
                if let Some(node) = target.upgrade() {
                    node.run_pending_effects();
                }
            });
        }
        Ok(())
    }

    /// Committed plain state plus current callbacks.
    pub(crate) fn whole_state(&self, node: &SliceNode) -> Result<SliceState> {
        let state = self
            .store
            .borrow()
            .slice(&node.name)
            .ok_or_else(|| Error::NotReady(node.name.clone()))?;
        Ok(SliceState::new(state, node.callbacks.borrow().clone()))
    }

    /// Dirty every consumer that read `node` before its own first commit.
    /// Consumers that have committed since are dropped from the list.
    fn notify_dependents(self: &Rc<Self>, node: &Rc<SliceNode>) {
        let dependents = std::mem::take(&mut *node.dependents.borrow_mut());
        let mut kept = Vec::with_capacity(dependents.len());
        for dependent in dependents {
            let Some(consumer) = dependent.consumer.upgrade() else {
                continue;
            };
            if consumer.initialized.get() {
                continue;
            }
            self.set_dirty(&consumer, dependent.from.clone());
            kept.push(dependent);
        }
        let mut current = node.dependents.borrow_mut();
        kept.append(&mut current);
        *current = kept;
    }

    fn notify_subscribers(&self, node: &SliceNode, state: &SliceState) {
        for listener in node.subscribers.snapshot() {
            if let Err(err) = listener(state) {
                warn!(slice = %node.name, error = %err, "subscriber failed");
            }
        }
    }
}
