//! Property keys tracked by the dependency graph.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One trackable location inside a structured object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropKey {
    /// A named record field.
    Field(Arc<str>),
    /// A sequence slot.
    Index(usize),
    /// The synthetic length of a sequence.
    Length,
    /// The synthetic whole-container key: the key set of a record, or the
    /// arrangement of a sequence.
    Shape,
}

impl PropKey {
    pub fn field(name: impl Into<Arc<str>>) -> Self {
        PropKey::Field(name.into())
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Field(name) => f.write_str(name),
            PropKey::Index(i) => write!(f, "{i}"),
            PropKey::Length => f.write_str("length"),
            PropKey::Shape => f.write_str("<shape>"),
        }
    }
}

/// The set of keys invalidated by one write or one sequence operation.
///
/// Most writes touch one to three keys, so the list usually stays inline.
pub type Invalidation = SmallVec<[PropKey; 4]>;
