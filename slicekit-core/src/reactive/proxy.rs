//! Read Proxy
//!
//! A slice's *whole state* is its committed store sub-state plus the
//! callbacks its last run exported. [`SliceState`] is that pair; it is cheap
//! to clone (two `Rc`s) and is what subscribers receive.
//!
//! [`TrackedState`] wraps a `SliceState` for a reader. When the read happens
//! inside an [`Observer`](super::Observer) binding, every `get` is recorded
//! in the observer's [`ReadLog`] together with the value seen, so a later
//! commit only has to notify that observer if one of those keys changed.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::exports::Callback;
use crate::error::{Error, Result};
use crate::store::SubState;

/// A single observed field.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Value(Value),
    Callback(Callback),
}

/// Committed plain state merged with exported callbacks.
#[derive(Debug, Clone)]
pub struct SliceState {
    state: SubState,
    callbacks: Rc<IndexMap<String, Callback>>,
}

impl SliceState {
    pub(crate) fn new(state: SubState, callbacks: Rc<IndexMap<String, Callback>>) -> Self {
        Self { state, callbacks }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn callback(&self, key: &str) -> Option<&Callback> {
        self.callbacks.get(key)
    }

    /// A callback shadows a plain value of the same name.
    pub fn field(&self, key: &str) -> Option<Field> {
        if let Some(callback) = self.callbacks.get(key) {
            return Some(Field::Callback(callback.clone()));
        }
        self.state.get(key).cloned().map(Field::Value)
    }

    /// The serializable part only.
    pub fn plain(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn to_value(&self) -> Value {
        Value::Object((*self.state).clone())
    }

    /// True when both views were built from the same committed sub-state.
    pub fn same_commit(&self, other: &SliceState) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

/// Per-observer record of `(slice, key) -> value seen`.
#[derive(Debug, Default)]
pub(crate) struct ReadLog {
    reads: RefCell<IndexMap<(String, String), Option<Field>>>,
}

impl ReadLog {
    pub(crate) fn record(&self, slice: &str, key: &str, seen: Option<Field>) {
        self.reads
            .borrow_mut()
            .entry((slice.to_string(), key.to_string()))
            .or_insert(seen);
    }

    pub(crate) fn clear(&self) {
        self.reads.borrow_mut().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.reads.borrow().len()
    }

    /// Whether any recorded key of `slice` now differs in `current`.
    pub(crate) fn is_stale(&self, slice: &str, current: &SliceState) -> bool {
        self.reads
            .borrow()
            .iter()
            .filter(|((name, _), _)| name == slice)
            .any(|((_, key), seen)| current.field(key) != *seen)
    }
}

/// Read-recording view handed out by [`Take::read`](crate::Take::read).
#[derive(Debug, Clone)]
pub struct TrackedState {
    slice: Rc<str>,
    whole: SliceState,
    log: Option<Rc<ReadLog>>,
}

impl TrackedState {
    pub(crate) fn new(slice: Rc<str>, whole: SliceState, log: Option<Rc<ReadLog>>) -> Self {
        Self { slice, whole, log }
    }

    fn observe(&self, key: &str) -> Option<Field> {
        let field = self.whole.field(key);
        if let Some(log) = &self.log {
            log.record(&self.slice, key, field.clone());
        }
        field
    }

    /// Plain value under `key`, recorded.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.observe(key)? {
            Field::Value(value) => Some(value),
            Field::Callback(_) => None,
        }
    }

    /// Callback under `key`, recorded.
    pub fn callback(&self, key: &str) -> Option<Callback> {
        match self.observe(key)? {
            Field::Callback(callback) => Some(callback),
            Field::Value(_) => None,
        }
    }

    pub fn call(&self, key: &str, arg: Value) -> Result<Value> {
        let callback = self.callback(key).ok_or_else(|| Error::MissingCallback {
            slice: self.slice.to_string(),
            key: key.to_string(),
        })?;
        Ok(callback.call(arg))
    }

    pub fn is_tracked(&self) -> bool {
        self.log.is_some()
    }

    /// The underlying view, without recording anything.
    pub fn untracked(&self) -> &SliceState {
        &self.whole
    }
}

/// Keeps the last materialized view so repeated reads of an unchanged
/// commit return the same `SliceState`.
#[derive(Debug, Default)]
pub(crate) struct StateCache {
    last: RefCell<Option<SliceState>>,
}

impl StateCache {
    pub(crate) fn get_or_build(
        &self,
        state: SubState,
        callbacks: impl FnOnce() -> Rc<IndexMap<String, Callback>>,
    ) -> SliceState {
        let mut last = self.last.borrow_mut();
        if let Some(cached) = last.as_ref() {
            if Rc::ptr_eq(&cached.state, &state) {
                return cached.clone();
            }
        }
        let whole = SliceState::new(state, callbacks());
        *last = Some(whole.clone());
        whole
    }
}
