//! Dependency Graph
//!
//! This module holds the two process-side data structures of the engine:
//!
//! - [`DependencyGraph`]: for every tracked object identity and every key read
//!   on it, the set of computations that read it.
//! - [`NotificationScheduler`]: the deduplicated pending set of invalidated
//!   computations and the task queue that carries the deferred flush.
//!
//! # Design Decisions
//!
//! 1. The graph is keyed by object identity, not by value. Two equal-looking
//!    records are unrelated; one record reachable through two paths is one
//!    node.
//!
//! 2. Graph entries hold only weak references to their targets. Once nothing
//!    else keeps a target alive its entry is reclaimed by [`DependencyGraph::sweep`].
//!
//! 3. Edges only disappear when a computation is disposed. A computation that
//!    stops reading a key keeps its edge until then; this can cause an extra
//!    re-run, never a missed one.

mod dependency;
mod key;
mod scheduler;

pub use dependency::DependencyGraph;
pub use key::{Invalidation, PropKey};
pub use scheduler::NotificationScheduler;
pub(crate) use scheduler::Task;
