//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Largest length a sequence may be grown to, matching classic array limits.
pub const MAX_SEQUENCE_LEN: usize = u32::MAX as usize;

/// How the deferred flush is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushStrategy {
    /// The flush is queued as a task; the host loop drains it with
    /// `Runtime::tick` or `Runtime::run_until_idle`.
    #[default]
    Manual,
    /// The flush is spawned on the ambient tokio runtime.
    Tokio,
}

/// Tunables for a [`Runtime`](crate::Runtime).
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use trellis_core::{FlushStrategy, RuntimeConfig};
///
/// let config = RuntimeConfig::from_json(r#"{ "flush": "tokio" }"#).unwrap();
/// assert_eq!(config.flush, FlushStrategy::Tokio);
/// assert_eq!(config.flush_limit, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub flush: FlushStrategy,
    /// Maximum consecutive flushes `run_until_idle` performs before giving up.
    pub flush_limit: usize,
    /// Start the invalidation recorder when the runtime is created.
    pub record_invalidations: bool,
    /// Reclaim entries of dropped objects at the end of every flush.
    pub sweep_on_flush: bool,
    /// Writes that would grow a sequence past this length are rejected.
    pub max_sequence_len: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush: FlushStrategy::Manual,
            flush_limit: 100,
            record_invalidations: false,
            sweep_on_flush: true,
            max_sequence_len: MAX_SEQUENCE_LEN,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(src: &str) -> Result<Self> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn with_flush(mut self, flush: FlushStrategy) -> Self {
        self.flush = flush;
        self
    }

    pub fn with_recording(mut self, enabled: bool) -> Self {
        self.record_invalidations = enabled;
        self
    }

    pub fn with_max_sequence_len(mut self, len: usize) -> Self {
        self.max_sequence_len = len;
        self
    }
}
