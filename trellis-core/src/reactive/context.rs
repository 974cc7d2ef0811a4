//! Reactive Context
//!
//! The tracking context answers one question for every property read: which
//! computation, if any, is running right now and should depend on it?
//!
//! # Implementation
//!
//! We keep a thread-local stack of frames instead of a single "current" slot.
//! Running a computation pushes a frame and the returned guard pops it, even
//! if the computation panics. A computation registered while another is
//! running simply stacks on top; when it finishes, the outer one resumes
//! tracking.
//!
//! Frames are tagged with the runtime that owns the computation. A read only
//! tracks when the top frame belongs to the reading object's runtime, so
//! isolated runtimes on one thread never leak edges into each other.

use std::cell::RefCell;
use std::marker::PhantomData;

use super::computation::ComputationId;
use super::runtime::RuntimeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Tracking {
        runtime: RuntimeId,
        computation: ComputationId,
    },
    Untracked,
}

/// Guard that pops its frame when dropped.
///
/// Not `Send`: a frame belongs to the thread that pushed it.
pub struct ReactiveContext {
    frame: Frame,
    _thread_bound: PhantomData<*const ()>,
}

impl ReactiveContext {
    /// Make `computation` the current computation of this thread.
    pub fn enter(runtime: RuntimeId, computation: ComputationId) -> Self {
        Self::push(Frame::Tracking {
            runtime,
            computation,
        })
    }

    /// Suspend tracking until the guard is dropped.
    pub fn untracked() -> Self {
        Self::push(Frame::Untracked)
    }

    fn push(frame: Frame) -> Self {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(frame));
        Self {
            frame,
            _thread_bound: PhantomData,
        }
    }

    /// True if reads on this thread are currently being tracked.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Frame::Tracking { .. })))
    }

    /// The computation that reads on `runtime`'s objects should be attributed to.
    pub fn current(runtime: RuntimeId) -> Option<ComputationId> {
        CONTEXT_STACK.with(|stack| match stack.borrow().last() {
            Some(Frame::Tracking {
                runtime: owner,
                computation,
            }) if *owner == runtime => Some(*computation),
            _ => None,
        })
    }

    /// Number of frames on this thread's stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(
                popped,
                Some(self.frame),
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.frame,
                popped
            );
        });
    }
}
