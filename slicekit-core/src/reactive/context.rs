//! Computation Context
//!
//! The context stack records which slice computation is currently running.
//! Hook declarations consult it to find the slice whose slots they address,
//! and cross-slice reads consult it to register pre-commit dependents.
//!
//! # Depth
//!
//! The stack is owned by the runtime and passed around explicitly rather than
//! living in a thread-local. Its depth never exceeds one: entering a second
//! computation while one is running is a usage error, not a nesting feature.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::UsageError;
use crate::graph::SliceNode;

#[derive(Default)]
pub struct ContextStack {
    current: RefCell<Option<Rc<SliceNode>>>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` the running computation until the guard is dropped.
    pub(crate) fn enter(&self, node: Rc<SliceNode>) -> Result<ContextGuard<'_>, UsageError> {
        let mut current = self.current.borrow_mut();
        if let Some(running) = current.as_ref() {
            return Err(UsageError::NestedHookContext {
                running: running.name.clone(),
                requested: node.name.clone(),
            });
        }
        *current = Some(node);
        Ok(ContextGuard { stack: self })
    }

    pub fn is_active(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub(crate) fn current(&self) -> Option<Rc<SliceNode>> {
        self.current.borrow().clone()
    }
}

/// Pops the context when dropped, including during unwinding.
pub(crate) struct ContextGuard<'a> {
    stack: &'a ContextStack,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.stack.current.borrow_mut().take();
    }
}
