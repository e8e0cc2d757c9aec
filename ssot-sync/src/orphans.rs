//! Mark-and-sweep bookkeeping for remote objects no source has claimed.
//!
//! Every bootstrapped object of a managed kind starts marked. Matching a
//! desired object to it un-marks it. Whatever is still marked when all
//! sources are done is deleted by the sweep.

use std::collections::BTreeMap;

use ssot_core::ObjectId;

/// Candidate deletions for one kind, keyed by id.
///
/// Lives inside the kind's critical section; it has no locking of its own.
#[derive(Debug, Clone)]
pub struct OrphanSet<E> {
    entries: BTreeMap<ObjectId, E>,
}

impl<E> Default for OrphanSet<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<E: Clone> OrphanSet<E> {
    pub fn mark(&mut self, id: ObjectId, object: E) {
        self.entries.insert(id, object);
    }

    /// Returns `true` if `id` was marked.
    pub fn unmark(&mut self, id: ObjectId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marked objects in id order.
    pub fn snapshot(&self) -> Vec<(ObjectId, E)> {
        self.entries
            .iter()
            .map(|(id, obj)| (*id, obj.clone()))
            .collect()
    }
}
