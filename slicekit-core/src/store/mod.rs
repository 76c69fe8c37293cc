//! Store
//!
//! The single source of truth: one map from slice name to that slice's plain
//! sub-state. Sub-states are replaced wholesale on every commit, so holders of
//! an older `Rc` keep a stable snapshot and a pointer comparison is enough to
//! tell whether anything was committed since.

mod action;

pub use action::{Action, ActionType, Phase, INIT_ACTION};

use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{ConfigurationError, Error, Result};

/// Plain state committed by one slice.
pub type SubState = Rc<Map<String, Value>>;

#[derive(Debug)]
pub struct Store {
    state: IndexMap<String, SubState>,
    log: VecDeque<Action>,
    capacity: usize,
}

impl Store {
    /// Create an empty store that remembers up to `capacity` actions.
    pub fn new(capacity: usize) -> Self {
        let mut store = Self {
            state: IndexMap::new(),
            log: VecDeque::new(),
            capacity,
        };
        store.record(Action::bootstrap());
        store
    }

    /// Rebuild a store by dispatching `actions` in order.
    pub fn replay(actions: impl IntoIterator<Item = Action>, capacity: usize) -> Result<Self> {
        let mut store = Self::new(capacity);
        for action in actions {
            store.dispatch(action)?;
        }
        Ok(store)
    }

    pub fn dispatch(&mut self, action: Action) -> Result<()> {
        self.reduce(&action)?;
        self.record(action);
        Ok(())
    }

    fn reduce(&mut self, action: &Action) -> Result<()> {
        let Some(action_type) = action.action_type() else {
            return Ok(());
        };
        let Value::Object(payload) = &action.payload else {
            return Err(Error::InvalidPayload(action.kind.clone()));
        };
        match action_type.phase {
            Phase::InitializeSlice => {
                if self.state.contains_key(&action_type.name) {
                    return Err(ConfigurationError::DuplicateSlice(action_type.name).into());
                }
                self.state.insert(action_type.name, Rc::new(payload.clone()));
            }
            Phase::SetState => {
                self.state.insert(action_type.name, Rc::new(payload.clone()));
            }
        }
        Ok(())
    }

    fn record(&mut self, action: Action) {
        if self.capacity == 0 {
            return;
        }
        if self.log.len() == self.capacity {
            self.log.pop_front();
        }
        self.log.push_back(action);
    }

    pub fn slice(&self, name: &str) -> Option<SubState> {
        self.state.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.contains_key(name)
    }

    /// The whole store as one JSON object.
    pub fn snapshot(&self) -> Value {
        Value::Object(
            self.state
                .iter()
                .map(|(name, sub)| (name.clone(), Value::Object((**sub).clone())))
                .collect(),
        )
    }

    /// Logged actions, oldest first.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.log.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn init(name: &str, value: Value) -> Action {
        Action::slice(&ActionType::new(Phase::InitializeSlice, name), payload(value))
    }

    #[test]
    fn initialize_then_replace() {
        let mut store = Store::new(16);
        store.dispatch(init("counter", json!({ "count": 0 }))).unwrap();
        let first = store.slice("counter").unwrap();

        let set = ActionType::new(Phase::SetState, "counter").with_trace(["0".to_string()]);
        store
            .dispatch(Action::slice(&set, payload(json!({ "count": 5 }))))
            .unwrap();

        let second = store.slice("counter").unwrap();
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(first["count"], json!(0));
        assert_eq!(second["count"], json!(5));
    }

    #[test]
    fn duplicate_initialize_is_rejected() {
        let mut store = Store::new(16);
        store.dispatch(init("counter", json!({}))).unwrap();
        let err = store.dispatch(init("counter", json!({}))).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn foreign_actions_pass_through() {
        let mut store = Store::new(16);
        store.dispatch(init("counter", json!({ "count": 1 }))).unwrap();
        let before = store.snapshot();
        store
            .dispatch(Action {
                kind: "@@redux/INIT.x".into(),
                payload: Value::Null,
            })
            .unwrap();
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn replay_rebuilds_snapshot() {
        let mut store = Store::new(16);
        store.dispatch(init("a", json!({ "x": 1 }))).unwrap();
        store.dispatch(init("b", json!({ "y": [1, 2] }))).unwrap();
        let set = ActionType::new(Phase::SetState, "a");
        store
            .dispatch(Action::slice(&set, payload(json!({ "x": 2 }))))
            .unwrap();

        let replayed = Store::replay(store.actions().cloned(), 16).unwrap();
        assert_eq!(replayed.snapshot(), store.snapshot());
        assert_eq!(replayed.snapshot(), json!({ "a": { "x": 2 }, "b": { "y": [1, 2] } }));
    }

    #[test]
    fn log_is_bounded() {
        let mut store = Store::new(2);
        store.dispatch(init("a", json!({}))).unwrap();
        store.dispatch(init("b", json!({}))).unwrap();
        let kinds: Vec<_> = store.actions().map(|a| a.kind.as_str()).collect();
        assert_eq!(kinds, vec!["initializeSlice::a", "initializeSlice::b"]);
    }
}
