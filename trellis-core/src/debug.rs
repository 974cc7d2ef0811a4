//! Debug instrumentation.
//!
//! Read-only views of the dependency graph and an opt-in recorder that
//! timestamps every invalidation. Nothing here affects reactivity; it exists
//! for inspectors and time-travel tooling.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::PropKey;
use crate::reactive::ComputationId;
use crate::value::ObjectId;

/// Copy of the dependency graph at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub targets: Vec<TargetSnapshot>,
}

/// Tracked keys of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub object: ObjectId,
    /// False if the object has been dropped but not yet swept.
    pub live: bool,
    pub keys: Vec<KeyDependents>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDependents {
    pub key: PropKey,
    pub dependents: Vec<ComputationId>,
}

impl GraphSnapshot {
    /// Dependents of `key` on `object`, if any edge exists.
    pub fn dependents_of(&self, object: ObjectId, key: &PropKey) -> Option<&[ComputationId]> {
        self.targets
            .iter()
            .find(|t| t.object == object)?
            .keys
            .iter()
            .find(|k| &k.key == key)
            .map(|k| k.dependents.as_slice())
    }

    pub fn edge_count(&self) -> usize {
        self.targets
            .iter()
            .flat_map(|t| &t.keys)
            .map(|k| k.dependents.len())
            .sum()
    }
}

/// One invalidation: a write or sequence operation that hit tracked keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    /// Position in the recording, starting at zero.
    pub seq: u64,
    /// Time since recording started.
    pub elapsed: Duration,
    pub object: ObjectId,
    pub keys: Vec<PropKey>,
    /// Computations handed to the scheduler by this invalidation.
    pub computations: Vec<ComputationId>,
}

/// Events captured between `start_recording` and `stop_recording`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub events: Vec<InvalidationEvent>,
}

impl Recording {
    /// Encode as MessagePack with named fields.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub(crate) struct Recorder {
    started: Instant,
    events: Vec<InvalidationEvent>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self {
            started: Instant::now(),
            events: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, object: ObjectId, keys: &[PropKey], computations: Vec<ComputationId>) {
        let seq = self.events.len() as u64;
        self.events.push(InvalidationEvent {
            seq,
            elapsed: self.started.elapsed(),
            object,
            keys: keys.to_vec(),
            computations,
        });
    }

    pub(crate) fn finish(self) -> Recording {
        Recording { events: self.events }
    }
}
