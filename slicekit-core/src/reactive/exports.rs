//! What a loop returns.
//!
//! A loop builds an [`Exports`] map. On commit the map is split in two:
//! callbacks stay with the slice, everything else (including memoized
//! values) is plain state and goes to the store.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

/// An exposed function with a stable identity.
///
/// Two callbacks are equal only if they are the same allocation.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(Value) -> Value>);

impl Callback {
    pub fn new(f: impl Fn(Value) -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, arg: Value) -> Value {
        (self.0)(arg)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Export {
    Value(Value),
    Callback(Callback),
}

/// Keyed output of one loop run, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Exports {
    entries: IndexMap<String, Export>,
}

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, Export::Value(value.into()));
        self
    }

    pub fn callback(mut self, key: impl Into<String>, callback: Callback) -> Self {
        self.insert(key, Export::Callback(callback));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, export: Export) {
        self.entries.insert(key.into(), export);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Split into the serializable payload and the callback map.
    pub fn partition(self) -> (Map<String, Value>, IndexMap<String, Callback>) {
        let mut plain = Map::new();
        let mut callbacks = IndexMap::new();
        for (key, export) in self.entries {
            match export {
                Export::Value(value) => {
                    plain.insert(key, value);
                }
                Export::Callback(callback) => {
                    callbacks.insert(key, callback);
                }
            }
        }
        (plain, callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partition_routes_only_callbacks_away_from_state() {
        let increment = Callback::new(|by| by);
        let exports = Exports::new()
            .value("count", 3)
            .value("doubled", 6)
            .callback("increment", increment.clone());

        let (plain, callbacks) = exports.partition();
        assert_eq!(Value::Object(plain), json!({ "count": 3, "doubled": 6 }));
        assert_eq!(callbacks.len(), 1);
        assert!(callbacks["increment"].ptr_eq(&increment));
    }

    #[test]
    fn callback_equality_is_identity() {
        let a = Callback::new(|v| v);
        let b = Callback::new(|v| v);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
