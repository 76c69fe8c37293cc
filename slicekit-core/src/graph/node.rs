//! Slice Nodes
//!
//! One node per registered slice. The node owns the slice's hook slots, its
//! exported callbacks, its dependents and its subscribers; the registry owns
//! the node.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tokio::sync::watch;
use tracing::warn;

use crate::error::{Result, UsageError};
use crate::reactive::{Callback, Exports, Hooks, SliceState, Subscribers};
use crate::reactive::{HookSlot, PendingEffect, Setter};

/// A slice's computation.
pub type LoopFn = dyn Fn(&Hooks) -> Result<Exports>;

/// Listener notified with the committed whole state.
pub type CommitListener = dyn Fn(&SliceState) -> Result<()>;

/// Re-dirties `consumer` when the owning node commits, until the consumer
/// has committed for the first time.
pub(crate) struct Dependent {
    pub(crate) consumer: Weak<SliceNode>,
    pub(crate) from: String,
}

pub struct SliceNode {
    pub(crate) name: String,

    /// Loop bound.
    pub(crate) ready: Cell<bool>,
    /// First state committed.
    pub(crate) initialized: Cell<bool>,
    /// State changed since the last run.
    pub(crate) dirty: Cell<bool>,
    /// A flush task is queued on the executor.
    pub(crate) scheduled: Cell<bool>,

    pub(crate) cursor: Cell<usize>,
    pub(crate) hooks: RefCell<Vec<HookSlot>>,
    pub(crate) callbacks: RefCell<Rc<IndexMap<String, Callback>>>,
    pub(crate) dependents: RefCell<Vec<Dependent>>,
    /// Diagnostic trace of what dirtied the node since the last run.
    pub(crate) froms: RefCell<SmallVec<[String; 4]>>,
    pub(crate) subscribers: Rc<Subscribers<CommitListener>>,
    pub(crate) looper: OnceCell<Rc<LoopFn>>,

    /// Effect decisions of the running computation; promoted on commit.
    /// `None` withdraws a body queued by an earlier commit.
    pub(crate) staged_effects: RefCell<IndexMap<usize, Option<PendingEffect>>>,
    /// Effects waiting for the end of the turn.
    pub(crate) pending_effects: RefCell<IndexMap<usize, PendingEffect>>,

    /// Flips to `true` once the first run has been attempted.
    pub(crate) settled: watch::Sender<bool>,
    pub(crate) runs: Cell<u64>,
}

impl SliceNode {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            name: name.into(),
            ready: Cell::new(false),
            initialized: Cell::new(false),
            dirty: Cell::new(false),
            scheduled: Cell::new(false),
            cursor: Cell::new(0),
            hooks: RefCell::new(Vec::new()),
            callbacks: RefCell::new(Rc::default()),
            dependents: RefCell::new(Vec::new()),
            froms: RefCell::new(SmallVec::new()),
            subscribers: Rc::new(Subscribers::new()),
            looper: OnceCell::new(),
            staged_effects: RefCell::new(IndexMap::new()),
            pending_effects: RefCell::new(IndexMap::new()),
            settled,
            runs: Cell::new(0),
        }
    }

    /// After a successful run the slot count must match what the first
    /// commit established.
    pub(crate) fn verify_hook_count(&self) -> Result<(), UsageError> {
        let declared = self.cursor.get();
        let mut hooks = self.hooks.borrow_mut();
        if self.initialized.get() {
            if declared != hooks.len() {
                return Err(UsageError::HookCountChanged {
                    slice: self.name.clone(),
                    expected: hooks.len(),
                    found: declared,
                });
            }
        } else {
            // Left over from an earlier, failed first run.
            hooks.truncate(declared);
        }
        Ok(())
    }

    /// Register `consumer` as a pre-commit dependent, once.
    pub(crate) fn add_dependent(&self, consumer: &Rc<SliceNode>, from: String) {
        let mut dependents = self.dependents.borrow_mut();
        let known = dependents
            .iter()
            .any(|d| d.consumer.upgrade().is_some_and(|c| Rc::ptr_eq(&c, consumer)));
        if !known {
            dependents.push(Dependent {
                consumer: Rc::downgrade(consumer),
                from,
            });
        }
    }

    /// Setters of every `state` cell, in slot order.
    pub(crate) fn state_setters(&self) -> Vec<Setter> {
        self.hooks
            .borrow()
            .iter()
            .filter_map(|slot| match slot {
                HookSlot::State(setter) => Some(setter.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn promote_staged_effects(&self) -> bool {
        let staged = std::mem::take(&mut *self.staged_effects.borrow_mut());
        let mut pending = self.pending_effects.borrow_mut();
        for (index, effect) in staged {
            match effect {
                Some(effect) => {
                    pending.insert(index, effect);
                }
                None => {
                    pending.shift_remove(&index);
                }
            }
        }
        !pending.is_empty()
    }

    /// Run queued effect bodies, each after its previous cleanup.
    pub(crate) fn run_pending_effects(&self) {
        let pending = std::mem::take(&mut *self.pending_effects.borrow_mut());
        for (index, effect) in pending {
            let previous = match self.hooks.borrow_mut().get_mut(index) {
                Some(HookSlot::Effect { cleanup, .. }) => cleanup.take(),
                _ => {
                    warn!(slice = %self.name, index, "effect slot vanished before it could run");
                    continue;
                }
            };
            if let Some(cleanup) = previous {
                cleanup();
            }

            let cleanup = (effect.body)();
            if let Some(HookSlot::Effect { deps, cleanup: slot }) = self.hooks.borrow_mut().get_mut(index) {
                *deps = Some(effect.deps);
                *slot = cleanup;
            }
        }
    }

    /// Number of times the loop has been invoked.
    pub fn run_count(&self) -> u64 {
        self.runs.get()
    }
}

impl fmt::Debug for SliceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceNode")
            .field("name", &self.name)
            .field("ready", &self.ready.get())
            .field("initialized", &self.initialized.get())
            .field("dirty", &self.dirty.get())
            .field("hooks", &self.hooks.borrow().len())
            .field("runs", &self.runs.get())
            .finish()
    }
}
