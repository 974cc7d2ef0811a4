//! Error types.
//!
//! Two families of failure exist in the engine:
//!
//! - [`StateError`]: returned synchronously to the caller of a read, write or
//!   host operation (frozen targets, wrong container kinds, bad arguments).
//! - [`ComputationError`]: produced when a computation fails while running.
//!   These are never returned to the mutation that triggered the run; they are
//!   forwarded to the runtime's error channel instead.

use std::fmt;

use thiserror::Error;

use crate::reactive::ComputationId;
use crate::value::{ObjectId, ObjectKind};

/// Result alias used throughout the crate.
pub type Result<T, E = StateError> = std::result::Result<T, E>;

/// Errors returned by state reads, writes and runtime operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// The target object has been frozen and rejects writes.
    #[error("object {0} is frozen")]
    Frozen(ObjectId),

    /// The operation needs a different kind of container.
    #[error("expected a {expected}, found a {found}")]
    KindMismatch {
        expected: ObjectKind,
        found: ObjectKind,
    },

    /// A key that cannot address the container (e.g. a field name on a sequence).
    #[error("key `{key}` cannot address a {kind}")]
    InvalidKey { key: String, kind: ObjectKind },

    /// Reactive state can only be created from a record or a sequence.
    #[error("reactive state requires a record or sequence value")]
    NotAnObject,

    /// A dynamic `invoke` named a method the mutation table does not know.
    #[error("unknown sequence method `{0}`")]
    UnknownMethod(String),

    /// A dynamic `invoke` received arguments it cannot use.
    #[error("invalid arguments for `{method}`: {reason}")]
    InvalidArguments { method: &'static str, reason: String },

    /// Exporting a value tree found a reference cycle.
    #[error("cycle detected at object {0}")]
    Cycle(ObjectId),

    /// The host loop kept flushing without reaching a quiescent state.
    #[error("flush limit of {0} consecutive cycles exceeded")]
    FlushLimit(usize),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode recording: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode recording: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// When a computation failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// The synchronous first run inside `run_effect`.
    Initial,
    /// A re-run during a scheduled flush.
    Flush,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Initial => f.write_str("initial run"),
            RunPhase::Flush => f.write_str("flush"),
        }
    }
}

/// Why a computation failed.
#[derive(Debug)]
pub enum FailureReason {
    /// The computation panicked; the payload is rendered to a string.
    Panicked(String),
    /// The computation returned an error.
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Panicked(msg) => write!(f, "panicked: {msg}"),
            FailureReason::Failed(err) => write!(f, "{err}"),
        }
    }
}

/// A failure reported on the runtime's error channel.
#[derive(Debug, Error)]
#[error("computation {computation} failed during {phase}: {reason}")]
pub struct ComputationError {
    pub computation: ComputationId,
    pub phase: RunPhase,
    pub reason: FailureReason,
}

impl ComputationError {
    /// True if the computation panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        matches!(self.reason, FailureReason::Panicked(_))
    }
}
