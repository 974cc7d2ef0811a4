//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects tracked objects,
//! computations, and the scheduler. It owns:
//!
//! - the dependency graph,
//! - the notification scheduler and its deferred task queue,
//! - the identity-keyed wrapper cache,
//! - the error channel and the debug recorder.
//!
//! # How It Works
//!
//! 1. A read through a [`ReactiveObject`] asks the tracking context for the
//!    current computation and, if there is one, records an edge.
//!
//! 2. A write that changes something computes the invalidated keys, looks up
//!    their dependents, and enqueues them.
//!
//! 3. The first enqueue of a burst schedules one deferred flush. The host
//!    drains it (`tick` / `run_until_idle`), or tokio runs it when the runtime
//!    is configured with [`FlushStrategy::Tokio`].
//!
//! # Threading
//!
//! Each thread has a default runtime, reachable through [`Runtime::current`]
//! and the crate-root free functions. Runtimes are `Send + Sync`, so a flush
//! may run on a tokio worker, but the engine assumes one logical thread of
//! mutation at a time.
//!
//! At most one flush (or initial run) is in flight per runtime. Flushes
//! spawned on tokio wait their turn; a computation found still running when
//! its flush reaches it is re-enqueued for the next flush, never dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, error, trace, warn};

use super::computation::{Computation, ComputationId, EffectHandle, EffectOutput, RunOutcome};
use super::context::ReactiveContext;
use super::view::{ReactiveObject, ViewInner};
use crate::config::{FlushStrategy, RuntimeConfig};
use crate::debug::{GraphSnapshot, Recorder, Recording};
use crate::error::{ComputationError, Result, RunPhase, StateError};
use crate::graph::{DependencyGraph, NotificationScheduler, PropKey, Task};
use crate::value::{Object, ObjectId, Value};

/// Identifies a runtime in tracking frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeId(u64);

impl RuntimeId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runtime#{}", self.0)
    }
}

/// Callback receiving computation failures.
pub type ErrorHandler = Arc<dyn Fn(&ComputationError) + Send + Sync>;

struct RuntimeInner {
    id: RuntimeId,
    config: RuntimeConfig,
    graph: Mutex<DependencyGraph>,
    computations: Mutex<HashMap<ComputationId, Arc<Computation>>>,
    scheduler: Mutex<NotificationScheduler>,
    /// Held while computations run. Reentrant so a computation may flush inline.
    flush_lock: ReentrantMutex<()>,
    views: DashMap<ObjectId, Weak<ViewInner>>,
    error_handler: RwLock<Option<ErrorHandler>>,
    recorder: Mutex<Option<Recorder>>,
}

thread_local! {
    static CURRENT: Runtime = Runtime::new(RuntimeConfig::default());
}

/// Handle to a reactive runtime. Clones share the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create an isolated runtime.
    pub fn new(config: RuntimeConfig) -> Self {
        let recorder = config.record_invalidations.then(Recorder::new);
        Self {
            inner: Arc::new(RuntimeInner {
                id: RuntimeId::next(),
                config,
                graph: Mutex::new(DependencyGraph::new()),
                computations: Mutex::new(HashMap::new()),
                scheduler: Mutex::new(NotificationScheduler::new()),
                flush_lock: ReentrantMutex::new(()),
                views: DashMap::new(),
                error_handler: RwLock::new(None),
                recorder: Mutex::new(recorder),
            }),
        }
    }

    /// This thread's default runtime.
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    pub fn id(&self) -> RuntimeId {
        self.inner.id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Interception entry points
    // ------------------------------------------------------------------

    /// Place a record or sequence under reactivity.
    ///
    /// Passing an object that is already reactive returns its existing view.
    pub fn create_reactive_state(&self, initial: impl Into<Value>) -> Result<ReactiveObject> {
        match initial.into() {
            Value::Object(target) => Ok(self.wrap(&target)),
            _ => Err(StateError::NotAnObject),
        }
    }

    /// The reactive view of `target`, taken from the wrapper cache.
    ///
    /// The same object always yields the same view while any handle to that
    /// view is alive.
    pub fn wrap(&self, target: &Object) -> ReactiveObject {
        match self.inner.views.entry(target.id()) {
            Entry::Occupied(mut slot) => {
                if let Some(existing) = slot.get().upgrade() {
                    return ReactiveObject::from_inner(existing);
                }
                let view = ReactiveObject::new(self.clone(), target.clone());
                slot.insert(view.downgrade());
                view
            }
            Entry::Vacant(slot) => {
                let view = ReactiveObject::new(self.clone(), target.clone());
                slot.insert(view.downgrade());
                view
            }
        }
    }

    pub(crate) fn track(&self, target: &Object, key: PropKey) {
        let Some(computation) = ReactiveContext::current(self.id()) else {
            return;
        };
        let mut graph = self.inner.graph.lock();
        if graph.track(target, key.clone(), computation) {
            trace!(object = %target.id(), %key, %computation, "tracked");
        }
    }

    /// Hand every dependent of `keys` on `target` to the scheduler.
    pub(crate) fn invalidate(&self, target: &Object, keys: &[PropKey]) {
        if keys.is_empty() {
            return;
        }
        let dependents = self.inner.graph.lock().dependents(target.id(), keys);
        trace!(object = %target.id(), ?keys, dependents = dependents.len(), "invalidated");

        if let Some(recorder) = self.inner.recorder.lock().as_mut() {
            recorder.record(target.id(), keys, dependents.iter().copied().collect());
        }
        for computation in dependents {
            self.enqueue(computation);
        }
    }

    // ------------------------------------------------------------------
    // Computations
    // ------------------------------------------------------------------

    /// Register a computation and run it once, synchronously.
    pub fn run_effect<F, R>(&self, f: F) -> EffectHandle
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: EffectOutput,
    {
        let computation = Arc::new(Computation::new(f));
        self.inner
            .computations
            .lock()
            .insert(computation.id(), Arc::clone(&computation));
        debug!(runtime = %self.id(), computation = %computation.id(), "effect registered");

        {
            let _running = self.inner.flush_lock.lock();
            self.execute(&computation, RunPhase::Initial);
        }
        EffectHandle::new(self.clone(), computation)
    }

    pub(crate) fn dispose(&self, computation: &Computation) {
        if !computation.mark_disposed() {
            return;
        }
        let id = computation.id();
        let edges = self.inner.graph.lock().forget(id);
        self.inner.scheduler.lock().remove(id);
        self.inner.computations.lock().remove(&id);
        debug!(runtime = %self.id(), computation = %id, edges, "effect disposed");
    }

    /// Returns false if the closure was not invoked.
    fn execute(&self, computation: &Computation, phase: RunPhase) -> bool {
        let ran = match computation.execute(self.id(), phase) {
            Ok(RunOutcome::Ran) => true,
            Ok(RunOutcome::Busy) => {
                trace!(runtime = %self.id(), computation = %computation.id(), "still running, requeued");
                self.enqueue(computation.id());
                false
            }
            Ok(RunOutcome::Disposed) => false,
            Err(err) => {
                self.report(err);
                true
            }
        };
        // Disposed from inside its own run: drop whatever it read afterwards.
        if computation.is_disposed() {
            self.inner.graph.lock().forget(computation.id());
        }
        ran
    }

    /// Add a computation to the pending set. No-op for unknown or disposed ones.
    pub(crate) fn enqueue(&self, id: ComputationId) {
        let alive = self
            .inner
            .computations
            .lock()
            .get(&id)
            .is_some_and(|c| !c.is_disposed());
        if !alive {
            return;
        }
        let needs_flush = self.inner.scheduler.lock().enqueue(id);
        if needs_flush {
            self.schedule_flush();
        }
    }

    fn schedule_flush(&self) {
        if self.inner.config.flush == FlushStrategy::Tokio {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let runtime = self.clone();
                    handle.spawn(async move {
                        runtime.flush_when_free().await;
                    });
                    return;
                }
                Err(_) => warn!(runtime = %self.id(), "no tokio runtime available, queueing flush for the host loop"),
            }
        }
        self.inner.scheduler.lock().push_task(Task::Flush);
    }

    /// Run every pending computation once. Returns how many ran.
    ///
    /// Computations invalidated while this runs are left for the next flush.
    /// Blocks while another thread is flushing this runtime.
    pub fn flush(&self) -> usize {
        let _flushing = self.inner.flush_lock.lock();
        self.flush_locked()
    }

    fn try_flush(&self) -> Option<usize> {
        let _flushing = self.inner.flush_lock.try_lock()?;
        Some(self.flush_locked())
    }

    async fn flush_when_free(&self) -> usize {
        loop {
            if let Some(ran) = self.try_flush() {
                return ran;
            }
            tokio::task::yield_now().await;
        }
    }

    fn flush_locked(&self) -> usize {
        let batch = self.inner.scheduler.lock().take_pending();
        if batch.is_empty() {
            return 0;
        }
        debug!(runtime = %self.id(), pending = batch.len(), "flush started");

        let mut ran = 0;
        for id in batch {
            let computation = self.inner.computations.lock().get(&id).cloned();
            let Some(computation) = computation else {
                continue;
            };
            if self.execute(&computation, RunPhase::Flush) {
                ran += 1;
            }
        }

        if self.inner.config.sweep_on_flush {
            self.sweep();
        }
        debug!(runtime = %self.id(), ran, "flush finished");
        ran
    }

    // ------------------------------------------------------------------
    // Host loop
    // ------------------------------------------------------------------

    /// Queue a host callback behind any already scheduled work.
    pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
        self.inner.scheduler.lock().push_task(Task::Deferred(Box::new(f)));
    }

    /// Run the next queued task. Returns false if the queue was empty.
    pub fn tick(&self) -> bool {
        let task = self.inner.scheduler.lock().pop_task();
        match task {
            Some(task) => {
                self.run_task(task);
                true
            }
            None => false,
        }
    }

    /// Drain the task queue, including flushes scheduled by earlier flushes.
    ///
    /// Returns the number of flushes performed. Fails with
    /// [`StateError::FlushLimit`] if more than `flush_limit` flushes are
    /// needed; the outstanding flush stays queued.
    pub fn run_until_idle(&self) -> Result<usize> {
        let limit = self.inner.config.flush_limit;
        let mut flushes = 0;
        loop {
            let task = self.inner.scheduler.lock().pop_task();
            match task {
                None => return Ok(flushes),
                Some(Task::Flush) if flushes >= limit => {
                    self.inner.scheduler.lock().requeue(Task::Flush);
                    warn!(runtime = %self.id(), limit, "flush limit exceeded");
                    return Err(StateError::FlushLimit(limit));
                }
                Some(task) => {
                    if matches!(task, Task::Flush) {
                        flushes += 1;
                    }
                    self.run_task(task);
                }
            }
        }
    }

    fn run_task(&self, task: Task) {
        match task {
            Task::Flush => {
                self.flush();
            }
            Task::Deferred(f) => f(),
        }
    }

    /// Yield to the async executor until no flush is outstanding or running.
    ///
    /// Queued tasks are run inline; flushes spawned on tokio are awaited.
    pub async fn settle(&self) {
        while self.is_flush_scheduled() || self.is_flushing() {
            if !self.tick() {
                tokio::task::yield_now().await;
            }
        }
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.scheduler.lock().is_flush_scheduled()
    }

    /// True while a flush or an initial run holds this runtime.
    pub fn is_flushing(&self) -> bool {
        self.inner.flush_lock.is_locked()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.scheduler.lock().pending_len()
    }

    pub fn computation_count(&self) -> usize {
        self.inner.computations.lock().len()
    }

    // ------------------------------------------------------------------
    // Error channel
    // ------------------------------------------------------------------

    /// Install the callback that receives computation failures.
    pub fn set_error_handler(&self, handler: impl Fn(&ComputationError) + Send + Sync + 'static) {
        *self.inner.error_handler.write() = Some(Arc::new(handler));
    }

    pub fn clear_error_handler(&self) {
        *self.inner.error_handler.write() = None;
    }

    fn report(&self, err: ComputationError) {
        let handler = self.inner.error_handler.read().clone();
        match handler {
            Some(handler) => handler(&err),
            None => error!(
                runtime = %self.id(),
                computation = %err.computation,
                phase = %err.phase,
                "unhandled computation failure: {}",
                err.reason
            ),
        }
    }

    // ------------------------------------------------------------------
    // Debug instrumentation
    // ------------------------------------------------------------------

    pub fn graph_snapshot(&self) -> GraphSnapshot {
        self.inner.graph.lock().snapshot()
    }

    /// Start timestamping invalidations. Restarts a recording in progress.
    pub fn start_recording(&self) {
        *self.inner.recorder.lock() = Some(Recorder::new());
    }

    /// Stop recording and return what was captured.
    pub fn stop_recording(&self) -> Recording {
        self.inner
            .recorder
            .lock()
            .take()
            .map(Recorder::finish)
            .unwrap_or_default()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recorder.lock().is_some()
    }

    /// Reclaim graph and wrapper-cache entries of dropped objects.
    ///
    /// Returns the number of graph targets removed.
    pub fn sweep(&self) -> usize {
        let removed = self.inner.graph.lock().sweep();
        self.inner.views.retain(|_, view| view.strong_count() > 0);
        if removed > 0 {
            trace!(runtime = %self.id(), removed, "swept dead targets");
        }
        removed
    }

    pub fn cached_view_count(&self) -> usize {
        self.inner.views.len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.id())
            .field("computations", &self.computation_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Run `f` without recording any dependencies.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::untracked();
    f()
}
