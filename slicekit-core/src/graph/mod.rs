//! Slice Graph
//!
//! Slices are the nodes of this graph. Edges come from two places:
//!
//! - A state cell inside a slice dirties its own node (handled by the
//!   scheduler).
//! - A slice that reads another slice before its own first commit is
//!   registered as a *dependent* of the slice it read, and is re-dirtied when
//!   that slice commits. Once the reader has committed, the edge retires;
//!   steady-state propagation goes through observers instead.
//!
//! The registry sequences initialization along registration order.

mod node;
mod registry;
mod scheduler;

pub use node::{CommitListener, LoopFn, SliceNode};
pub(crate) use registry::{ready_creator, Creator};
