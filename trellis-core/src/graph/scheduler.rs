//! Notification Scheduler
//!
//! Collects invalidated computations into a deduplicated pending set and
//! makes sure exactly one deferred flush is outstanding while the set is
//! non-empty.
//!
//! # Algorithm
//!
//! 1. `enqueue` inserts into the pending set (first-enqueued order). If no
//!    flush is outstanding, the caller is told to schedule one.
//! 2. The flush takes the whole pending set in one step and clears the
//!    outstanding flag before running anything.
//! 3. Computations invalidated while the flush runs therefore land in a fresh
//!    pending set and cause a new deferred flush. Flushes never recurse.
//!
//! The scheduler also owns the host task queue: the deferred flush itself and
//! any host callbacks queued with `Runtime::defer`.

use std::collections::VecDeque;
use std::fmt;
use std::mem;

use indexmap::IndexSet;

use crate::reactive::ComputationId;

/// A unit of deferred work drained by the host loop.
pub(crate) enum Task {
    Flush,
    Deferred(Box<dyn FnOnce() + Send>),
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Flush => f.write_str("Flush"),
            Task::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

/// Pending set plus deferred-task queue.
#[derive(Debug, Default)]
pub struct NotificationScheduler {
    pending: IndexSet<ComputationId>,
    flush_scheduled: bool,
    tasks: VecDeque<Task>,
}

impl NotificationScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a computation to the pending set.
    ///
    /// Returns true when the caller must schedule a deferred flush.
    pub fn enqueue(&mut self, computation: ComputationId) -> bool {
        self.pending.insert(computation);
        if self.flush_scheduled {
            false
        } else {
            self.flush_scheduled = true;
            true
        }
    }

    /// Take the pending set for a flush and clear the outstanding flag.
    pub fn take_pending(&mut self) -> IndexSet<ComputationId> {
        self.flush_scheduled = false;
        mem::take(&mut self.pending)
    }

    /// Drop a computation from the pending set.
    pub fn remove(&mut self, computation: ComputationId) -> bool {
        self.pending.shift_remove(&computation)
    }

    pub fn is_pending(&self, computation: ComputationId) -> bool {
        self.pending.contains(&computation)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }

    pub(crate) fn push_task(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// Put a task back at the head of the queue.
    pub(crate) fn requeue(&mut self, task: Task) {
        self.tasks.push_front(task);
    }

    pub(crate) fn pop_task(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn queued_tasks(&self) -> usize {
        self.tasks.len()
    }
}
