//! Microtask Executor
//!
//! Every deferred piece of work (scheduled flushes, effect drains, slice
//! initialization) is a future spawned onto one `LocalPool`. Nothing runs
//! until the host drives the pool, so "the current synchronous turn" is
//! simply everything that happens between two calls to
//! [`Executor::run_until_stalled`].

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::rc::Rc;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use tracing::{error, warn};

use crate::error::{Error, Result};

pub struct Executor {
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    _not_send: PhantomData<Rc<()>>,
}

impl Executor {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: RefCell::new(pool),
            spawner,
            _not_send: PhantomData,
        }
    }

    /// Queue a task. It first runs on the next drive of the pool.
    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        if let Err(err) = self.spawner.spawn_local(task) {
            error!(error = %err, "failed to queue microtask");
        }
    }

    /// Run queued tasks until none can make progress.
    ///
    /// Returns `false` when called from inside a task, which would otherwise
    /// re-enter the pool.
    pub fn run_until_stalled(&self) -> bool {
        match self.pool.try_borrow_mut() {
            Ok(mut pool) => {
                pool.run_until_stalled();
                true
            }
            Err(_) => {
                warn!("run_until_stalled called from inside a running task; ignoring");
                false
            }
        }
    }

    /// Drive the pool until `future` completes.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        let mut pool = self.pool.try_borrow_mut().map_err(|_| Error::Reentrant)?;
        Ok(pool.run_until(future))
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn tasks_wait_for_the_pool() {
        let executor = Executor::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        executor.spawn(async move { flag.set(true) });

        assert!(!ran.get());
        assert!(executor.run_until_stalled());
        assert!(ran.get());
    }

    #[test]
    fn tasks_spawned_by_tasks_run_in_the_same_drive() {
        let executor = Rc::new(Executor::new());
        let count = Rc::new(Cell::new(0));

        let inner_exec = executor.clone();
        let inner_count = count.clone();
        executor.spawn(async move {
            inner_count.set(inner_count.get() + 1);
            let nested = inner_count.clone();
            inner_exec.spawn(async move { nested.set(nested.get() + 1) });
        });

        executor.run_until_stalled();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn block_on_returns_output() {
        let executor = Executor::new();
        assert_eq!(executor.block_on(async { 7 }).unwrap(), 7);
    }
}
