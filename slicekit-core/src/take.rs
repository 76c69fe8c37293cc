//! External handle to a registered slice.

use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::error::{ConfigurationError, Error, Result};
use crate::graph::{CommitListener, SliceNode};
use crate::middleware::Middleware;
use crate::reactive::{Runtime, RuntimeInner, Setter, SliceState, StateCache, Subscription, TrackedState};

/// Handle returned by [`Runtime::create_slice`].
///
/// Every read flushes the slice first if it is dirty, so a value written by a
/// setter is visible to the next read without driving the executor.
#[derive(Clone)]
pub struct Take {
    runtime: Rc<RuntimeInner>,
    node: Rc<SliceNode>,
    cache: Rc<StateCache>,
    label: Rc<str>,
}

impl Take {
    pub(crate) fn new(runtime: Rc<RuntimeInner>, node: Rc<SliceNode>) -> Self {
        let label: Rc<str> = Rc::from(node.name.as_str());
        Self {
            runtime,
            node,
            cache: Rc::new(StateCache::default()),
            label,
        }
    }

    #[cfg(test)]
    pub(crate) fn node(&self) -> &Rc<SliceNode> {
        &self.node
    }

    /// A handle that does not keep the slice or runtime alive, for listeners
    /// stored on the slice itself.
    pub(crate) fn downgrade(&self) -> WeakTake {
        WeakTake {
            runtime: Rc::downgrade(&self.runtime),
            node: Rc::downgrade(&self.node),
        }
    }

    pub fn name(&self) -> &str {
        &self.label
    }

    /// Whether the slice has committed its first state.
    pub fn ready(&self) -> bool {
        self.node.initialized.get()
    }

    /// Resolves once the slice's first run has been attempted. Check
    /// [`Take::ready`] afterwards to see whether it committed.
    pub fn when_ready(&self) -> impl Future<Output = ()> + 'static {
        let mut settled = self.node.settled.subscribe();
        async move {
            let _ = settled.wait_for(|done| *done).await;
        }
    }

    /// Current whole state.
    ///
    /// Called from inside another slice's loop before that slice has
    /// committed, this registers the caller as a dependent, so it reruns when
    /// this slice next commits. Called inside [`Observer::track`], the
    /// returned view records its reads for that observer.
    ///
    /// [`Observer::track`]: crate::reactive::Observer::track
    pub fn read(&self) -> Result<TrackedState> {
        let consumer = self.runtime.contexts.current();
        if let Some(consumer) = &consumer {
            if !consumer.initialized.get() && !Rc::ptr_eq(consumer, &self.node) {
                let from = format!("{}@{}", self.node.name, consumer.cursor.get());
                self.node.add_dependent(consumer, from);
            }
        }

        self.runtime.flush(&self.node)?;
        let state = self
            .runtime
            .store
            .borrow()
            .slice(&self.node.name)
            .ok_or_else(|| Error::NotReady(self.node.name.clone()))?;
        let whole = self
            .cache
            .get_or_build(state, || self.node.callbacks.borrow().clone());

        let log = if consumer.is_some() {
            None
        } else {
            self.runtime
                .binding
                .borrow()
                .as_ref()
                .map(|observer| observer.log.clone())
        };
        Ok(TrackedState::new(self.label.clone(), whole, log))
    }

    pub fn select<R>(&self, selector: impl FnOnce(&TrackedState) -> R) -> Result<R> {
        Ok(selector(&self.read()?))
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read()?.get(key))
    }

    /// Invoke the exported callback `key`.
    pub fn call(&self, key: &str, arg: impl Into<Value>) -> Result<Value> {
        self.read()?.call(key, arg.into())
    }

    /// Values of the slice's `state` cells, in slot order.
    pub fn hook_states(&self) -> Vec<Value> {
        self.node.state_setters().iter().map(Setter::get).collect()
    }

    /// Overwrite every `state` cell, in slot order. The count must match
    /// exactly; on mismatch nothing is written.
    pub fn set_hook_states(&self, values: Vec<Value>) -> Result<()> {
        let setters = self.node.state_setters();
        if setters.len() != values.len() {
            return Err(ConfigurationError::HookStateCount {
                slice: self.node.name.clone(),
                expected: setters.len(),
                actual: values.len(),
            }
            .into());
        }
        for (setter, value) in setters.iter().zip(values) {
            setter.set(value);
        }
        Ok(())
    }

    /// Call `listener` with the whole state after every commit.
    pub fn subscribe(&self, listener: impl Fn(&SliceState) -> Result<()> + 'static) -> Subscription {
        let listener: Rc<CommitListener> = Rc::new(listener);
        self.node.subscribers.add(listener)
    }

    /// Wrap this handle with `middleware`.
    pub fn with(&self, middleware: impl Middleware) -> Result<Take> {
        middleware.apply(self.clone())
    }

    pub fn runtime(&self) -> Runtime {
        Runtime::from_inner(self.runtime.clone())
    }

    /// Number of times the slice's loop has been invoked.
    pub fn run_count(&self) -> u64 {
        self.node.run_count()
    }
}

pub(crate) struct WeakTake {
    runtime: Weak<RuntimeInner>,
    node: Weak<SliceNode>,
}

impl WeakTake {
    pub(crate) fn upgrade(&self) -> Option<Take> {
        Some(Take::new(self.runtime.upgrade()?, self.node.upgrade()?))
    }
}

impl fmt::Debug for Take {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Take")
            .field("name", &self.node.name)
            .field("ready", &self.ready())
            .field("dirty", &self.node.dirty.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UsageError;
    use crate::reactive::{Exports, Hooks};
    use serde_json::json;

    fn counter(hooks: &Hooks) -> Result<Exports> {
        let (count, setter) = hooks.state(0)?;
        let increment = hooks.callback(
            move |by| {
                let by = by.as_i64().unwrap_or(1);
                setter.update(move |prev| json!(prev.as_i64().unwrap_or(0) + by))
            },
            &[],
        )?;
        Ok(Exports::new().value("count", count).callback("increment", increment))
    }

    #[test]
    fn read_before_ready_is_not_ready() {
        let runtime = Runtime::new();
        let take = runtime.create_slice("counter", counter).unwrap();
        assert!(matches!(take.read().unwrap_err(), Error::NotReady(name) if name == "counter"));
    }

    #[test]
    fn reads_flush_pending_writes() {
        let runtime = Runtime::new();
        let take = runtime.create_slice("counter", counter).unwrap();
        runtime.run_until_stalled();

        take.call("increment", 5).unwrap();
        assert!(take.node().dirty.get());
        assert_eq!(take.get("count").unwrap(), Some(json!(5)));
        assert!(!take.node().dirty.get());

        // The queued flush finds nothing left to do.
        runtime.run_until_stalled();
        assert_eq!(take.run_count(), 2);
    }

    #[test]
    fn callbacks_are_not_plain_state() {
        let runtime = Runtime::new();
        let take = runtime.create_slice("counter", counter).unwrap();
        runtime.run_until_stalled();

        let view = take.read().unwrap();
        assert_eq!(view.get("increment"), None);
        assert!(view.callback("increment").is_some());
        assert_eq!(runtime.snapshot(), json!({ "counter": { "count": 0 } }));
        assert!(matches!(
            take.call("decrement", 1).unwrap_err(),
            Error::MissingCallback { ref key, .. } if key == "decrement"
        ));
    }

    #[test]
    fn select_projects_the_current_state() {
        let runtime = Runtime::new();
        let take = runtime.create_slice("counter", counter).unwrap();
        runtime.run_until_stalled();

        let doubled = take
            .select(|state| state.get("count").and_then(|v| v.as_i64()).map(|n| n * 2))
            .unwrap();
        assert_eq!(doubled, Some(0));
    }

    #[test]
    fn hook_states_cover_state_cells_only() {
        let runtime = Runtime::new();
        let take = runtime
            .create_slice("form", |hooks| {
                let (name, _) = hooks.state("ada")?;
                let upper = hooks.memo(|| json!(name.as_str().unwrap_or("").to_uppercase()), &[name.clone()])?;
                let (age, _) = hooks.state(36)?;
                Ok(Exports::new().value("name", name).value("upper", upper).value("age", age))
            })
            .unwrap();
        runtime.run_until_stalled();

        assert_eq!(take.hook_states(), vec![json!("ada"), json!(36)]);
        take.set_hook_states(vec![json!("grace"), json!(85)]).unwrap();
        assert_eq!(take.get("upper").unwrap(), Some(json!("GRACE")));
    }

    #[test]
    fn set_hook_states_rejects_count_mismatch_without_writing() {
        let runtime = Runtime::new();
        let take = runtime.create_slice("counter", counter).unwrap();
        runtime.run_until_stalled();

        let err = take.set_hook_states(vec![json!(1), json!(2)]).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::HookStateCount { expected: 1, actual: 2, .. })
        ));
        assert_eq!(take.hook_states(), vec![json!(0)]);
        assert!(!take.node().dirty.get());
    }

    #[test]
    fn when_ready_resolves_after_first_run() {
        let runtime = Runtime::new();
        let take = runtime.create_slice("counter", counter).unwrap();
        runtime.block_on(take.when_ready()).unwrap();
        assert!(take.ready());
    }

    #[test]
    fn reading_a_dirty_slice_from_another_loop_is_nested() {
        let runtime = Runtime::new();
        let a = runtime.create_slice("a", counter).unwrap();

        let source = a.clone();
        let failures = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = failures.clone();
        let b = runtime
            .create_slice("b", move |hooks| {
                let (_, bump) = hooks.state(0)?;
                let poke = hooks.callback(move |_| bump.update(|prev| json!(prev.as_i64().unwrap_or(0) + 1)), &[])?;
                let seen = match source.get("count") {
                    Ok(seen) => seen.unwrap_or(Value::Null),
                    Err(err) => {
                        sink.borrow_mut().push(err);
                        Value::Null
                    }
                };
                Ok(Exports::new().value("seen", seen).callback("poke", poke))
            })
            .unwrap();
        runtime.run_until_stalled();
        assert_eq!(b.get("seen").unwrap(), Some(json!(0)));

        // Both dirty; flushing `b` first makes its loop try to flush `a`.
        a.call("increment", 1).unwrap();
        b.call("poke", Value::Null).unwrap();
        assert_eq!(b.get("seen").unwrap(), Some(Value::Null));
        assert!(matches!(
            failures.borrow().as_slice(),
            [Error::Usage(UsageError::NestedHookContext { running, requested })]
                if running == "b" && requested == "a"
        ));

        // `a` stayed dirty and its queued flush still runs.
        assert!(a.node().dirty.get());
        runtime.run_until_stalled();
        assert_eq!(a.get("count").unwrap(), Some(json!(1)));
    }
}
