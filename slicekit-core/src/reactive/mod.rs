//! Reactive Primitives
//!
//! This module implements the hook-slot runtime that slices are written
//! against: positional state cells, memos, callbacks and effects, the setters
//! that dirty a slice, and the read-tracking views handed to observers.
//!
//! # Concepts
//!
//! ## Hooks
//!
//! A slice's loop is a plain function of [`Hooks`]. Each declaration claims
//! the next positional slot; the slot survives between runs, so `state`
//! returns the current value instead of the initial one on every run after
//! the first.
//!
//! ## Setters
//!
//! A [`Setter`] writes one state cell. A write that changes the value marks
//! the owning slice dirty and queues a flush on the runtime's microtask
//! queue; equal values are ignored.
//!
//! ## Read tracking
//!
//! [`TrackedState`] records which keys an [`Observer`] read, so that a commit
//! only wakes the observers whose keys changed.
//!
//! # Implementation Notes
//!
//! The currently running computation is held by a [`ContextStack`] owned by
//! the runtime. At most one computation runs at a time; hook calls made
//! outside of it, or on behalf of a different slice, are usage errors.

mod context;
pub mod draft;
mod exports;
mod hooks;
mod observer;
mod proxy;
mod runtime;
mod setter;
mod subscriber;

pub use context::ContextStack;
pub use exports::{Callback, Export, Exports};
pub use hooks::{Cleanup, Deps, HookKind, Hooks};
pub use observer::Observer;
pub use proxy::{Field, SliceState, TrackedState};
pub use runtime::Runtime;
pub use setter::{Setter, Update};
pub use subscriber::{SubscriberId, Subscription};

pub(crate) use hooks::{HookSlot, PendingEffect};
pub(crate) use proxy::StateCache;
pub(crate) use runtime::RuntimeInner;
pub(crate) use subscriber::Subscribers;
