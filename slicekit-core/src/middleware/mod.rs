//! Take Middleware
//!
//! A middleware receives a slice handle, attaches whatever listeners or
//! restore logic it needs, and hands back the handle callers should use.
//! Middlewares compose by chaining [`Take::with`].

mod persist;

pub use persist::{MemoryStorage, Persist, Storage};

use crate::error::Result;
use crate::take::Take;

pub trait Middleware {
    fn apply(self, take: Take) -> Result<Take>;
}

impl<F> Middleware for F
where
    F: FnOnce(Take) -> Result<Take>,
{
    fn apply(self, take: Take) -> Result<Take> {
        self(take)
    }
}
