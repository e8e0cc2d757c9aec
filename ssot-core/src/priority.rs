//! Source priority table.
//!
//! Built from an ordered list of source names, first = highest. Ranks are
//! positive integers: with `n` sources, the first ranks `n` and the last `1`.
//! Only the relative order matters to callers.

use std::collections::HashMap;

use crate::error::PriorityError;
use crate::types::SourceName;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePriority {
    order: Vec<SourceName>,
    ranks: HashMap<SourceName, u32>,
}

impl SourcePriority {
    /// Build the table from names ordered highest priority first.
    ///
    /// Returns [`PriorityError::EmptyName`] for a blank name and
    /// [`PriorityError::Duplicate`] when a name appears twice.
    pub fn from_names<I, S>(names: I) -> Result<Self, PriorityError>
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceName>,
    {
        let order: Vec<SourceName> = names.into_iter().map(Into::into).collect();
        let len = order.len() as u32;
        let mut ranks = HashMap::with_capacity(order.len());
        for (index, name) in order.iter().enumerate() {
            if name.as_str().trim().is_empty() {
                return Err(PriorityError::EmptyName);
            }
            if ranks.insert(name.clone(), len - index as u32).is_some() {
                return Err(PriorityError::Duplicate(name.0.clone()));
            }
        }
        Ok(Self { order, ranks })
    }

    /// Rank of `source`; higher wins.
    pub fn rank(&self, source: &SourceName) -> Option<u32> {
        self.ranks.get(source).copied()
    }

    /// Rank by bare name, for owners read back from stored objects.
    pub fn rank_of(&self, name: &str) -> Option<u32> {
        self.ranks.get(name).copied()
    }

    /// Like [`rank`](Self::rank) but an unranked source is an error.
    pub fn require(&self, source: &SourceName) -> Result<u32, PriorityError> {
        self.rank(source)
            .ok_or_else(|| PriorityError::UnknownSource(source.0.clone()))
    }

    pub fn contains(&self, source: &SourceName) -> bool {
        self.ranks.contains_key(source)
    }

    /// Sources, highest priority first.
    pub fn names(&self) -> &[SourceName] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
