//! Slicekit Core
//!
//! This crate provides the runtime for Slicekit: named state *slices*, each
//! computed by a hook-driven loop and committed into a single JSON store.
//! It implements:
//!
//! - Positional hooks (state, memo, callback, effect) with checked slot order
//! - A dirty/flush scheduler that coalesces writes into one rerun per turn
//! - Ordered slice registration with readiness tracking
//! - Read tracking for external observers
//! - A persistence middleware over pluggable storage
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Hook slots, setters, read proxies and the runtime handle
//! - `graph`: Slice nodes, registration order and the flush scheduler
//! - `store`: The action reducer and action log
//! - `middleware`: Wrappers attached to a slice handle
//! - `executor`: The microtask queue everything deferred runs on
//!
//! # Example
//!
//! ```rust,ignore
//! use slicekit_core::{Exports, Runtime};
//! use serde_json::json;
//!
//! let runtime = Runtime::new();
//! let counter = runtime.create_slice("counter", |hooks| {
//!     let (count, set_count) = hooks.state(0)?;
//!     let increment = hooks.callback(
//!         move |by| set_count.update(move |prev| json!(prev.as_i64().unwrap_or(0) + by.as_i64().unwrap_or(1))),
//!         &[],
//!     )?;
//!     Ok(Exports::new().value("count", count).callback("increment", increment))
//! })?;
//!
//! runtime.run_until_stalled();
//! counter.call("increment", 3)?;
//! counter.call("increment", 2)?;
//! assert_eq!(counter.get("count")?, Some(json!(5)));
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod graph;
pub mod middleware;
pub mod reactive;
pub mod store;
mod take;

pub use config::RuntimeConfig;
pub use error::{ConfigurationError, Error, Result, UsageError};
pub use gate::ReadinessGate;
pub use middleware::{MemoryStorage, Middleware, Persist, Storage};
pub use reactive::{Callback, Exports, Hooks, Observer, Runtime, Setter, SliceState, Subscription, TrackedState, Update};
pub use take::Take;
