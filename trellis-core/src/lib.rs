//! Trellis Core
//!
//! This crate provides a fine-grained reactive state engine. Plain records
//! and sequences are placed under reactivity; computations that read them are
//! re-run when, and only when, something they read changes.
//!
//! It implements:
//!
//! - Per-key dependency tracking across nested and cyclic object graphs
//! - Identity-stable reactive views
//! - Precise invalidation for bulk sequence operations
//! - Batched, deduplicated, deferred re-execution
//! - An error channel and debug instrumentation
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: Raw values and shared, identity-bearing objects
//! - `graph`: Dependency graph and notification scheduler
//! - `reactive`: Reactive views, computations and the runtime
//! - `debug`: Graph snapshots and invalidation recordings
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use trellis_core::{Object, Runtime};
//!
//! let rt = Runtime::default();
//! let state = rt
//!     .create_reactive_state(Object::from_fields([("count", 0)]))
//!     .unwrap();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let (s, log) = (state.clone(), seen.clone());
//! let _effect = rt.run_effect(move || {
//!     let count = s.get("count").and_then(|p| p.as_i64());
//!     log.lock().unwrap().push(count);
//! });
//!
//! state.set("count", 5).unwrap();
//! state.set("count", 6).unwrap();
//! rt.run_until_idle().unwrap();
//!
//! // Two writes, one re-run.
//! assert_eq!(*seen.lock().unwrap(), vec![Some(0), Some(6)]);
//! ```
//!
//! The free functions below operate on the calling thread's default runtime.

pub mod config;
pub mod debug;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod value;

pub use config::{FlushStrategy, RuntimeConfig};
pub use debug::{GraphSnapshot, InvalidationEvent, Recording};
pub use error::{ComputationError, FailureReason, Result, RunPhase, StateError};
pub use graph::PropKey;
pub use reactive::{
    untrack, ComputationId, EffectHandle, EffectOutput, Key, Prop, ReactiveObject, RunState, Runtime,
};
pub use value::{Object, ObjectId, ObjectKind, Value, WeakObject};

/// Place a record or sequence under reactivity on this thread's runtime.
pub fn create_reactive_state(initial: impl Into<Value>) -> Result<ReactiveObject> {
    Runtime::current().create_reactive_state(initial)
}

/// Register and immediately run a computation on this thread's runtime.
pub fn run_effect<F, R>(f: F) -> EffectHandle
where
    F: Fn() -> R + Send + Sync + 'static,
    R: EffectOutput,
{
    Runtime::current().run_effect(f)
}

/// Drain this thread's runtime. See [`Runtime::run_until_idle`].
pub fn run_until_idle() -> Result<usize> {
    Runtime::current().run_until_idle()
}

/// Run this thread's pending computations once.
pub fn flush() -> usize {
    Runtime::current().flush()
}

/// Install the error channel of this thread's runtime.
pub fn set_error_handler(handler: impl Fn(&ComputationError) + Send + Sync + 'static) {
    Runtime::current().set_error_handler(handler)
}
