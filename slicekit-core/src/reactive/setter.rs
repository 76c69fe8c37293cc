//! State-cell setters.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::trace;

use super::draft;
use super::runtime::RuntimeInner;
use crate::graph::SliceNode;

/// How a setter derives the next value from the current one.
pub enum Update {
    /// Use this value.
    Replace(Value),
    /// Pure reducer over the current value.
    Reduce(Box<dyn FnOnce(&Value) -> Value>),
    /// Edit a draft in place. Object and array state is edited through
    /// [`draft::produce`]; scalars are edited on a plain copy.
    Mutate(Box<dyn FnOnce(&mut Value)>),
}

struct StateCell {
    value: RefCell<Value>,
    index: usize,
    runtime: Weak<RuntimeInner>,
    slice: Weak<SliceNode>,
}

/// Stable handle to one `state` cell.
///
/// The same setter is returned on every run of the slice, so it can be
/// captured once by callbacks and effects.
#[derive(Clone)]
pub struct Setter {
    cell: Rc<StateCell>,
}

impl Setter {
    pub(crate) fn new(
        initial: Value,
        index: usize,
        runtime: Weak<RuntimeInner>,
        slice: Weak<SliceNode>,
    ) -> Self {
        Self {
            cell: Rc::new(StateCell {
                value: RefCell::new(initial),
                index,
                runtime,
                slice,
            }),
        }
    }

    /// Current cell content.
    pub fn get(&self) -> Value {
        self.cell.value.borrow().clone()
    }

    pub fn set(&self, value: impl Into<Value>) -> Value {
        self.dispatch(Update::Replace(value.into()))
    }

    pub fn update(&self, reducer: impl FnOnce(&Value) -> Value + 'static) -> Value {
        self.dispatch(Update::Reduce(Box::new(reducer)))
    }

    pub fn mutate(&self, mutator: impl FnOnce(&mut Value) + 'static) -> Value {
        self.dispatch(Update::Mutate(Box::new(mutator)))
    }

    /// Apply `update` to the value the cell holds *now* and mark the slice
    /// dirty if the result differs. Returns the resulting value.
    pub fn dispatch(&self, update: Update) -> Value {
        let previous = self.get();
        let next = match update {
            Update::Replace(value) => value,
            Update::Reduce(reducer) => reducer(&previous),
            Update::Mutate(mutator) if draft::is_simple(&previous) => {
                let mut copy = previous.clone();
                mutator(&mut copy);
                copy
            }
            Update::Mutate(mutator) => {
                let produced = draft::produce(&previous, mutator);
                for patch in &produced.patches {
                    trace!(hook = self.cell.index, %patch, "draft patch");
                }
                produced.value
            }
        };

        if next == previous {
            return next;
        }
        *self.cell.value.borrow_mut() = next.clone();

        if let (Some(runtime), Some(slice)) = (self.cell.runtime.upgrade(), self.cell.slice.upgrade()) {
            runtime.set_dirty(&slice, self.cell.index.to_string());
        }
        next
    }

    pub fn ptr_eq(&self, other: &Setter) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl PartialEq for Setter {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Setter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter")
            .field("index", &self.cell.index)
            .field("value", &*self.cell.value.borrow())
            .finish()
    }
}
