//! Reactive State
//!
//! This module implements the core reactive system: reactive views over
//! records and sequences, and the computations that read them.
//!
//! # Concepts
//!
//! ## Reactive views
//!
//! A [`ReactiveObject`] wraps a raw [`Object`](crate::Object). Reading a key
//! through the view inside a running computation records that the computation
//! depends on exactly that key of exactly that object. Writing a key through
//! the view notifies exactly the computations that read it.
//!
//! ## Computations
//!
//! A computation is a side-effecting function registered with
//! [`Runtime::run_effect`]. It runs once immediately, then again (in a
//! deferred flush) every time something it read changes, until it is
//! disposed through its [`EffectHandle`].
//!
//! # Implementation Notes
//!
//! Dependencies are detected through a thread-local tracking context. When a
//! view is read, we check whether a computation of that view's runtime is
//! running and, if so, record the edge. Dependencies accumulate across runs;
//! edges a computation no longer reads are only dropped when it is disposed.

mod computation;
mod context;
mod runtime;
mod sequence;
mod view;

pub use computation::{ComputationId, EffectHandle, EffectOutput, RunState};
pub use context::ReactiveContext;
pub use runtime::{untrack, ErrorHandler, Runtime, RuntimeId};
pub use sequence::{SeqMethod, SeqOp};
pub use view::{Key, Prop, ReactiveObject};
