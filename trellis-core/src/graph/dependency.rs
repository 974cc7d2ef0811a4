//! Per-(object, key) dependency edges.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use super::key::PropKey;
use crate::debug::{GraphSnapshot, KeyDependents, TargetSnapshot};
use crate::reactive::ComputationId;
use crate::value::{Object, ObjectId, WeakObject};

struct TargetEntry {
    target: WeakObject,
    keys: IndexMap<PropKey, IndexSet<ComputationId>>,
}

/// Maps tracked object identities to keys to dependent computations.
///
/// Insertion order is preserved at every level so that invalidation hands
/// computations to the scheduler in a deterministic order.
#[derive(Default)]
pub struct DependencyGraph {
    targets: HashMap<ObjectId, TargetEntry>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `computation` read `key` on `target`.
    ///
    /// Idempotent. Returns true if the edge is new.
    pub fn track(&mut self, target: &Object, key: PropKey, computation: ComputationId) -> bool {
        let entry = self.targets.entry(target.id()).or_insert_with(|| TargetEntry {
            target: target.downgrade(),
            keys: IndexMap::new(),
        });
        entry.keys.entry(key).or_default().insert(computation)
    }

    /// Every tracked key on `target` with its current dependents.
    pub fn keys_of(&self, target: ObjectId) -> Vec<(PropKey, Vec<ComputationId>)> {
        self.targets
            .get(&target)
            .map(|entry| {
                entry
                    .keys
                    .iter()
                    .map(|(key, deps)| (key.clone(), deps.iter().copied().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The union of dependents of `keys` on `target`, deduplicated, in the
    /// order they are first found.
    pub fn dependents<'a, I>(&self, target: ObjectId, keys: I) -> IndexSet<ComputationId>
    where
        I: IntoIterator<Item = &'a PropKey>,
    {
        let mut out = IndexSet::new();
        if let Some(entry) = self.targets.get(&target) {
            for key in keys {
                if let Some(deps) = entry.keys.get(key) {
                    out.extend(deps.iter().copied());
                }
            }
        }
        out
    }

    /// Remove `computation` from every key set of every target.
    ///
    /// Returns the number of edges removed. Key sets and targets left empty
    /// are dropped.
    pub fn forget(&mut self, computation: ComputationId) -> usize {
        let mut removed = 0;
        for entry in self.targets.values_mut() {
            entry.keys.retain(|_, deps| {
                if deps.shift_remove(&computation) {
                    removed += 1;
                }
                !deps.is_empty()
            });
        }
        self.targets.retain(|_, entry| !entry.keys.is_empty());
        removed
    }

    /// Drop entries whose target object no longer exists.
    pub fn sweep(&mut self) -> usize {
        let before = self.targets.len();
        self.targets.retain(|_, entry| entry.target.is_live());
        before - self.targets.len()
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn edge_count(&self) -> usize {
        self.targets
            .values()
            .flat_map(|entry| entry.keys.values())
            .map(IndexSet::len)
            .sum()
    }

    /// Read-only copy of the graph, ordered by object id.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut targets: Vec<TargetSnapshot> = self
            .targets
            .iter()
            .map(|(id, entry)| TargetSnapshot {
                object: *id,
                live: entry.target.is_live(),
                keys: entry
                    .keys
                    .iter()
                    .map(|(key, deps)| KeyDependents {
                        key: key.clone(),
                        dependents: deps.iter().copied().collect(),
                    })
                    .collect(),
            })
            .collect();
        targets.sort_by_key(|t| t.object);
        GraphSnapshot { targets }
    }
}
