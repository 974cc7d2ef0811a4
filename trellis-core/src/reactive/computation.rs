//! Computation (Effect) Lifecycle
//!
//! A computation is a re-runnable closure tied to the properties it reads.
//!
//! # How Computations Work
//!
//! 1. `run_effect` registers the computation and runs it once, synchronously,
//!    with itself as the current computation. Every tracked read records an
//!    edge in the dependency graph.
//!
//! 2. A later write to a tracked property hands the computation to the
//!    scheduler. The next flush runs it again, which re-records its edges.
//!
//! 3. Disposing removes every edge and any pending membership. A disposed
//!    computation never runs again; disposing twice does nothing.
//!
//! # Failures
//!
//! A closure may return `()` or `Result<(), E>`. Both returned errors and
//! panics are caught at the run boundary and reported on the runtime's error
//! channel. A failed computation stays registered and will run again on the
//! next invalidation.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::context::ReactiveContext;
use super::runtime::{Runtime, RuntimeId};
use crate::error::{ComputationError, FailureReason, RunPhase};

/// Unique identifier for a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComputationId(u64);

impl ComputationId {
    /// Generate a new unique computation ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ComputationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// Lifecycle state of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Disposed,
}

/// What a call to `Computation::execute` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Ran,
    /// Already running; the caller must re-enqueue it.
    Busy,
    Disposed,
}

/// Values a computation closure may return.
pub trait EffectOutput {
    fn into_outcome(self) -> Result<(), Box<dyn Error + Send + Sync>>;
}

impl EffectOutput for () {
    fn into_outcome(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

impl<E> EffectOutput for Result<(), E>
where
    E: Error + Send + Sync + 'static,
{
    fn into_outcome(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)
    }
}

type EffectFn = Box<dyn Fn() -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync>;

pub(crate) struct Computation {
    id: ComputationId,
    run: EffectFn,
    state: Mutex<RunState>,
    run_count: AtomicUsize,
}

impl Computation {
    pub(crate) fn new<F, R>(f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: EffectOutput,
    {
        Self {
            id: ComputationId::new(),
            run: Box::new(move || f().into_outcome()),
            state: Mutex::new(RunState::Idle),
            run_count: AtomicUsize::new(0),
        }
    }

    pub(crate) fn id(&self) -> ComputationId {
        self.id
    }

    pub(crate) fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.state() == RunState::Disposed
    }

    pub(crate) fn run_count(&self) -> usize {
        self.run_count.load(Ordering::Relaxed)
    }

    /// Returns false if it was already disposed.
    pub(crate) fn mark_disposed(&self) -> bool {
        let mut state = self.state.lock();
        if *state == RunState::Disposed {
            return false;
        }
        *state = RunState::Disposed;
        true
    }

    /// Run the closure as the current computation of `runtime`.
    ///
    /// Does not run a disposed computation, nor one that is already running
    /// on this or another thread.
    pub(crate) fn execute(&self, runtime: RuntimeId, phase: RunPhase) -> Result<RunOutcome, ComputationError> {
        {
            let mut state = self.state.lock();
            match *state {
                RunState::Disposed => return Ok(RunOutcome::Disposed),
                RunState::Running => return Ok(RunOutcome::Busy),
                RunState::Idle => *state = RunState::Running,
            }
        }

        let outcome = {
            let _ctx = ReactiveContext::enter(runtime, self.id);
            panic::catch_unwind(AssertUnwindSafe(|| (self.run)()))
        };
        self.run_count.fetch_add(1, Ordering::Relaxed);

        {
            let mut state = self.state.lock();
            if *state == RunState::Running {
                *state = RunState::Idle;
            }
        }

        let reason = match outcome {
            Ok(Ok(())) => return Ok(RunOutcome::Ran),
            Ok(Err(err)) => FailureReason::Failed(err),
            Err(payload) => FailureReason::Panicked(panic_message(payload.as_ref())),
        };
        Err(ComputationError {
            computation: self.id,
            phase,
            reason,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle returned by `run_effect`.
///
/// Dropping the handle does not dispose the computation; call
/// [`EffectHandle::dispose`] to tear it down.
#[derive(Clone)]
pub struct EffectHandle {
    runtime: Runtime,
    computation: Arc<Computation>,
}

impl EffectHandle {
    pub(crate) fn new(runtime: Runtime, computation: Arc<Computation>) -> Self {
        Self {
            runtime,
            computation,
        }
    }

    pub fn id(&self) -> ComputationId {
        self.computation.id()
    }

    /// Remove the computation from the graph and the pending set.
    ///
    /// Idempotent. A run already in progress finishes, but nothing it reads
    /// afterwards is kept.
    pub fn dispose(&self) {
        self.runtime.dispose(&self.computation);
    }

    pub fn is_disposed(&self) -> bool {
        self.computation.is_disposed()
    }

    pub fn state(&self) -> RunState {
        self.computation.state()
    }

    /// How many times the closure has been invoked, failures included.
    pub fn run_count(&self) -> usize {
        self.computation.run_count()
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .finish()
    }
}
