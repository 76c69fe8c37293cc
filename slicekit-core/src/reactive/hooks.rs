//! Hook Slots
//!
//! A loop declares its cells by calling methods on [`Hooks`]. Cells are
//! addressed by call position: the n-th declaration in a run always refers to
//! slot n. That only works if every run declares the same kinds in the same
//! order, so both are checked: a kind change at a position, or a different
//! slot count after the first commit, is a [`UsageError`].
//!
//! | kind       | payload              | recomputed when          |
//! |------------|----------------------|--------------------------|
//! | `state`    | value + setter       | never (setter writes)    |
//! | `memo`     | deps + value         | deps differ              |
//! | `callback` | deps + callback      | deps differ              |
//! | `effect`   | deps + cleanup       | deps differ (deferred)   |

use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use smallvec::SmallVec;

use super::exports::Callback;
use super::runtime::RuntimeInner;
use super::setter::Setter;
use crate::error::{Result, UsageError};
use crate::graph::SliceNode;

/// Flat dependency list of a memo, callback or effect.
pub type Deps = SmallVec<[Value; 4]>;

/// Teardown returned by an effect body.
pub type Cleanup = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    State,
    Memo,
    Callback,
    Effect,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookKind::State => "state",
            HookKind::Memo => "memo",
            HookKind::Callback => "callback",
            HookKind::Effect => "effect",
        })
    }
}

pub(crate) enum HookSlot {
    State(Setter),
    Memo { deps: Deps, value: Value },
    Callback { deps: Deps, callback: Callback },
    /// `deps` is `None` until the body has run once.
    Effect { deps: Option<Deps>, cleanup: Option<Cleanup> },
}

impl HookSlot {
    pub(crate) fn kind(&self) -> HookKind {
        match self {
            HookSlot::State(_) => HookKind::State,
            HookSlot::Memo { .. } => HookKind::Memo,
            HookSlot::Callback { .. } => HookKind::Callback,
            HookSlot::Effect { .. } => HookKind::Effect,
        }
    }
}

/// An effect body waiting for the end of the turn.
pub(crate) struct PendingEffect {
    pub(crate) deps: Deps,
    pub(crate) body: Box<dyn FnOnce() -> Option<Cleanup>>,
}

/// Pairwise comparison; a length change is an error rather than "changed".
fn deps_unchanged(slice: &str, index: usize, previous: &[Value], current: &[Value]) -> Result<bool, UsageError> {
    if previous.len() != current.len() {
        return Err(UsageError::DepsLengthChanged {
            slice: slice.to_string(),
            index,
            previous: previous.len(),
            current: current.len(),
        });
    }
    Ok(previous.iter().zip(current).all(|(a, b)| a == b))
}

/// Hook declaration handle passed to a slice's loop.
///
/// The handle is bound to one slice. Declaring through it is only valid while
/// that slice's computation is the one running.
#[derive(Clone)]
pub struct Hooks {
    runtime: Weak<RuntimeInner>,
    node: Rc<SliceNode>,
}

impl Hooks {
    pub(crate) fn new(runtime: Weak<RuntimeInner>, node: Rc<SliceNode>) -> Self {
        Self { runtime, node }
    }

    /// Name of the slice this handle declares into.
    pub fn slice(&self) -> &str {
        &self.node.name
    }

    /// Consume the next position, checking context and kind.
    fn claim(&self, kind: HookKind) -> Result<usize, UsageError> {
        let runtime = self.runtime.upgrade().ok_or(UsageError::NotInHookContext)?;
        match runtime.contexts.current() {
            None => return Err(UsageError::NotInHookContext),
            Some(running) if !Rc::ptr_eq(&running, &self.node) => {
                return Err(UsageError::NestedHookContext {
                    running: running.name.clone(),
                    requested: self.node.name.clone(),
                })
            }
            Some(_) => {}
        }

        let index = self.node.cursor.get();
        self.node.cursor.set(index + 1);

        let hooks = self.node.hooks.borrow();
        match hooks.get(index) {
            Some(slot) if slot.kind() != kind => Err(UsageError::HookKindMismatch {
                slice: self.node.name.clone(),
                index,
                expected: slot.kind(),
                found: kind,
            }),
            Some(_) => Ok(index),
            None if self.node.initialized.get() => Err(UsageError::HookCountChanged {
                slice: self.node.name.clone(),
                expected: hooks.len(),
                found: index + 1,
            }),
            None => Ok(index),
        }
    }

    fn put(&self, index: usize, slot: HookSlot) {
        let mut hooks = self.node.hooks.borrow_mut();
        if index < hooks.len() {
            hooks[index] = slot;
        } else {
            hooks.push(slot);
        }
    }

    /// Declare a state cell. `initial` is used on the first run only.
    pub fn state(&self, initial: impl Into<Value>) -> Result<(Value, Setter)> {
        let initial = initial.into();
        self.state_with(move || initial)
    }

    /// Like [`Hooks::state`], but the initial value is computed lazily.
    pub fn state_with(&self, init: impl FnOnce() -> Value) -> Result<(Value, Setter)> {
        let index = self.claim(HookKind::State)?;
        let existing = match self.node.hooks.borrow().get(index) {
            Some(HookSlot::State(setter)) => Some(setter.clone()),
            _ => None,
        };
        let setter = match existing {
            Some(setter) => setter,
            None => {
                let setter = Setter::new(init(), index, self.runtime.clone(), Rc::downgrade(&self.node));
                self.put(index, HookSlot::State(setter.clone()));
                setter
            }
        };
        Ok((setter.get(), setter))
    }

    /// Declare a memoized value, recomputed when `deps` change.
    pub fn memo(&self, compute: impl FnOnce() -> Value, deps: &[Value]) -> Result<Value> {
        let index = self.claim(HookKind::Memo)?;
        let cached = match self.node.hooks.borrow().get(index) {
            Some(HookSlot::Memo { deps: previous, value }) => {
                if deps_unchanged(&self.node.name, index, previous, deps)? {
                    Some(value.clone())
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(value) = cached {
            return Ok(value);
        }

        let value = compute();
        self.put(
            index,
            HookSlot::Memo {
                deps: deps.iter().cloned().collect(),
                value: value.clone(),
            },
        );
        Ok(value)
    }

    /// Declare a callback whose identity only changes with `deps`.
    pub fn callback(&self, f: impl Fn(Value) -> Value + 'static, deps: &[Value]) -> Result<Callback> {
        let index = self.claim(HookKind::Callback)?;
        let cached = match self.node.hooks.borrow().get(index) {
            Some(HookSlot::Callback { deps: previous, callback }) => {
                if deps_unchanged(&self.node.name, index, previous, deps)? {
                    Some(callback.clone())
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(callback) = cached {
            return Ok(callback);
        }

        let callback = Callback::new(f);
        self.put(
            index,
            HookSlot::Callback {
                deps: deps.iter().cloned().collect(),
                callback: callback.clone(),
            },
        );
        Ok(callback)
    }

    /// Declare a side effect. The body runs after the current turn, once on
    /// the first commit and again whenever `deps` change; the cleanup it
    /// returns runs before the next body.
    ///
    /// `deps` are compared with those of the body that last *ran*. A body
    /// queued by an earlier commit in the same turn is replaced by this
    /// run's body, or withdrawn when `deps` are back where they were.
    pub fn effect(&self, body: impl FnOnce() -> Option<Cleanup> + 'static, deps: &[Value]) -> Result<()> {
        let index = self.claim(HookKind::Effect)?;
        let unchanged = match self.node.hooks.borrow().get(index) {
            Some(HookSlot::Effect { deps: Some(previous), .. }) => {
                deps_unchanged(&self.node.name, index, previous, deps)?
            }
            _ => false,
        };
        if index >= self.node.hooks.borrow().len() {
            self.put(index, HookSlot::Effect { deps: None, cleanup: None });
        }
        let staged = (!unchanged).then(|| PendingEffect {
            deps: deps.iter().cloned().collect(),
            body: Box::new(body),
        });
        self.node.staged_effects.borrow_mut().insert(index, staged);
        Ok(())
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("slice", &self.node.name)
            .field("cursor", &self.node.cursor.get())
            .finish()
    }
}
