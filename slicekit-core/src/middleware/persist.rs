//! Persistence middleware.
//!
//! The persisted form of a slice is its hook-state array (the values of its
//! `state` cells in slot order), MessagePack-encoded under a single key.
//! Cells left out by a whitelist or blacklist are stored as `null` and keep
//! their current value on restore.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::{info, warn};

use super::Middleware;
use crate::error::Result;
use crate::take::Take;

/// Byte-oriented key/value backend.
pub trait Storage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn store(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
}

/// In-process storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn store(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.entries.borrow_mut().insert(key.to_string(), bytes);
        Ok(())
    }
}

/// Which state cells, by position among the slice's `state` cells, are
/// persisted. The whitelist applies first, then the blacklist.
#[derive(Debug, Clone, Default)]
struct CellFilter {
    whitelist: Vec<usize>,
    blacklist: Vec<usize>,
}

impl CellFilter {
    fn keeps(&self, index: usize) -> bool {
        (self.whitelist.is_empty() || self.whitelist.contains(&index)) && !self.blacklist.contains(&index)
    }

    fn persisted(&self, states: Vec<Value>) -> Vec<Value> {
        states
            .into_iter()
            .enumerate()
            .map(|(index, value)| if self.keeps(index) { value } else { Value::Null })
            .collect()
    }

    /// Stored values for kept cells, current values for the rest. A length
    /// mismatch is passed through for `set_hook_states` to reject.
    fn merge(&self, stored: Vec<Value>, current: Vec<Value>) -> Vec<Value> {
        if stored.len() != current.len() {
            return stored;
        }
        stored
            .into_iter()
            .zip(current)
            .enumerate()
            .map(|(index, (stored, current))| if self.keeps(index) { stored } else { current })
            .collect()
    }
}

/// Restores a slice's state cells from `storage` once the slice is ready,
/// and writes them back after every commit that changed them.
///
/// ```rust,ignore
/// let take = runtime
///     .create_slice("todos", todos)?
///     .with(Persist::new("todos", storage.clone()).blacklist([1]).debug(true))?;
/// ```
pub struct Persist<S> {
    key: String,
    storage: S,
    filter: CellFilter,
    debug: bool,
}

impl<S: Storage + 'static> Persist<S> {
    pub fn new(key: impl Into<String>, storage: S) -> Self {
        Self {
            key: key.into(),
            storage,
            filter: CellFilter::default(),
            debug: false,
        }
    }

    /// Persist only these state cells. Empty means all of them.
    pub fn whitelist(mut self, cells: impl IntoIterator<Item = usize>) -> Self {
        self.filter.whitelist.extend(cells);
        self
    }

    /// Never persist these state cells.
    pub fn blacklist(mut self, cells: impl IntoIterator<Item = usize>) -> Self {
        self.filter.blacklist.extend(cells);
        self
    }

    /// Log every write at `info` level.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }
}

impl<S: Storage + 'static> Middleware for Persist<S> {
    fn apply(self, take: Take) -> Result<Take> {
        let Persist {
            key,
            storage,
            filter,
            debug,
        } = self;
        let filter = Rc::new(filter);

        let restored: Option<Vec<Value>> = match storage.load(&key)? {
            Some(bytes) => Some(rmp_serde::from_slice(&bytes)?),
            None => None,
        };
        let last = Rc::new(RefCell::new(restored.clone()));
        // Commits before the restore lands must not overwrite the stored copy.
        let restoring = Rc::new(Cell::new(restored.is_some()));

        if let Some(values) = restored {
            let ready = take.when_ready();
            let target = take.downgrade();
            let pending = restoring.clone();
            let slot = key.clone();
            let cells = filter.clone();
            take.runtime().spawn(async move {
                ready.await;
                pending.set(false);
                let Some(target) = target.upgrade() else {
                    return;
                };
                let values = cells.merge(values, target.hook_states());
                if let Err(err) = target.set_hook_states(values) {
                    warn!(slice = %target.name(), key = %slot, error = %err, "rejected persisted state");
                }
            });
        }

        let source = take.downgrade();
        // Lives as long as the slice.
        let _subscription = take.subscribe(move |_| {
            if restoring.get() {
                return Ok(());
            }
            let Some(source) = source.upgrade() else {
                return Ok(());
            };
            let current = filter.persisted(source.hook_states());
            if last.borrow().as_ref() == Some(&current) {
                return Ok(());
            }
            storage.store(&key, rmp_serde::to_vec(&current)?)?;
            if debug {
                info!(slice = %source.name(), %key, state = ?current, "persisted");
            }
            *last.borrow_mut() = Some(current);
            Ok(())
        });
        Ok(take)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Exports, Hooks, Runtime};
    use crate::Error;
    use serde_json::json;

    fn counter(hooks: &Hooks) -> Result<Exports> {
        let (count, setter) = hooks.state(0)?;
        let increment = hooks.callback(
            move |_| setter.update(|prev| json!(prev.as_i64().unwrap_or(0) + 1)),
            &[],
        )?;
        Ok(Exports::new().value("count", count).callback("increment", increment))
    }

    #[test]
    fn writes_through_on_change() {
        let storage = MemoryStorage::new();
        let runtime = Runtime::new();
        let take = runtime
            .create_slice("counter", counter)
            .unwrap()
            .with(Persist::new("counter", storage.clone()))
            .unwrap();
        runtime.run_until_stalled();
        // The first commit is written as well.
        assert!(storage.contains("counter"));

        take.call("increment", Value::Null).unwrap();
        runtime.run_until_stalled();

        let bytes = storage.load("counter").unwrap().unwrap();
        let saved: Vec<Value> = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(saved, vec![json!(1)]);
    }

    #[test]
    fn restores_once_ready() {
        let storage = MemoryStorage::new();
        storage.store("counter", rmp_serde::to_vec(&vec![json!(41)]).unwrap()).unwrap();

        let runtime = Runtime::new();
        let take = runtime
            .create_slice("counter", counter)
            .unwrap()
            .with(Persist::new("counter", storage.clone()).debug(true))
            .unwrap();
        runtime.run_until_stalled();

        assert_eq!(take.get("count").unwrap(), Some(json!(41)));
        let saved: Vec<Value> = rmp_serde::from_slice(&storage.load("counter").unwrap().unwrap()).unwrap();
        assert_eq!(saved, vec![json!(41)]);
        take.call("increment", Value::Null).unwrap();
        runtime.run_until_stalled();
        let saved: Vec<Value> = rmp_serde::from_slice(&storage.load("counter").unwrap().unwrap()).unwrap();
        assert_eq!(saved, vec![json!(42)]);
    }

    #[test]
    fn mismatched_restore_is_rejected() {
        let storage = MemoryStorage::new();
        storage
            .store("counter", rmp_serde::to_vec(&vec![json!(1), json!(2)]).unwrap())
            .unwrap();

        let runtime = Runtime::new();
        let take = runtime
            .create_slice("counter", counter)
            .unwrap()
            .with(Persist::new("counter", storage))
            .unwrap();
        runtime.run_until_stalled();
        assert_eq!(take.get("count").unwrap(), Some(json!(0)));
    }

    #[test]
    fn corrupt_bytes_fail_attach() {
        let storage = MemoryStorage::new();
        storage.store("counter", vec![0xc1]).unwrap();

        let runtime = Runtime::new();
        let err = runtime
            .create_slice("counter", counter)
            .unwrap()
            .with(Persist::new("counter", storage))
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    fn form(hooks: &Hooks) -> Result<Exports> {
        let (text, set_text) = hooks.state("")?;
        let (count, set_count) = hooks.state(0)?;
        let edit = hooks.callback(move |value| set_text.set(value), &[])?;
        let submit = hooks.callback(move |value| set_count.set(value), &[])?;
        Ok(Exports::new()
            .value("text", text)
            .value("count", count)
            .callback("edit", edit)
            .callback("submit", submit))
    }

    fn saved(storage: &MemoryStorage, key: &str) -> Vec<Value> {
        rmp_serde::from_slice(&storage.load(key).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn blacklisted_cells_are_neither_written_nor_restored() {
        let storage = MemoryStorage::new();
        let runtime = Runtime::new();
        let take = runtime
            .create_slice("form", form)
            .unwrap()
            .with(Persist::new("form", storage.clone()).blacklist([0]))
            .unwrap();
        runtime.run_until_stalled();
        take.call("edit", "secret").unwrap();
        take.call("submit", 3).unwrap();
        runtime.run_until_stalled();
        assert_eq!(saved(&storage, "form"), vec![Value::Null, json!(3)]);

        let next = Runtime::new();
        let restored = next
            .create_slice("form", form)
            .unwrap()
            .with(Persist::new("form", storage.clone()).blacklist([0]))
            .unwrap();
        next.run_until_stalled();
        assert_eq!(restored.get("text").unwrap(), Some(json!("")));
        assert_eq!(restored.get("count").unwrap(), Some(json!(3)));
    }

    #[test]
    fn whitelist_limits_what_is_written() {
        let storage = MemoryStorage::new();
        let runtime = Runtime::new();
        let take = runtime
            .create_slice("form", form)
            .unwrap()
            .with(Persist::new("form", storage.clone()).whitelist([1]))
            .unwrap();
        runtime.run_until_stalled();
        take.call("submit", 2).unwrap();
        runtime.run_until_stalled();
        assert_eq!(saved(&storage, "form"), vec![Value::Null, json!(2)]);

        // Only the excluded cell changes, so the stored copy stays as it was.
        take.call("edit", "draft").unwrap();
        runtime.run_until_stalled();
        assert_eq!(saved(&storage, "form"), vec![Value::Null, json!(2)]);
    }

    #[test]
    fn filter_applies_whitelist_then_blacklist() {
        let filter = CellFilter {
            whitelist: vec![0, 1],
            blacklist: vec![1],
        };
        assert!(filter.keeps(0));
        assert!(!filter.keeps(1));
        assert!(!filter.keeps(2));
        assert_eq!(
            filter.merge(vec![json!("a"), json!("b"), json!("c")], vec![json!(1), json!(2), json!(3)]),
            vec![json!("a"), json!(2), json!(3)]
        );
        assert_eq!(filter.merge(vec![json!("a")], vec![json!(1), json!(2)]), vec![json!("a")]);
    }
}
