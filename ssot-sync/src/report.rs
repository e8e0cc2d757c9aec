//! Run outcome: per-kind tallies, recorded errors, sources and sweep results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use ssot_core::{EntityKind, ObjectId, SourceName};

use crate::error::SyncError;
use crate::store::LoadStats;

/// Upsert outcomes for one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindTally {
    pub created: usize,
    pub patched: usize,
    pub unchanged: usize,
    pub would_create: usize,
    pub would_patch: usize,
    pub failed: usize,
}

impl KindTally {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One failed operation, flattened for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceName>,
    /// Natural key or other identifying text for the object involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    pub message: String,
}

impl RunError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            source: None,
            object: None,
            message: message.into(),
        }
    }

    pub fn from_sync(err: &SyncError, source: Option<&SourceName>) -> Self {
        Self {
            kind: err.kind(),
            source: source.cloned(),
            object: None,
            message: err.to_string(),
        }
    }

    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn source(mut self, source: SourceName) -> Self {
        self.source = Some(source);
        self
    }

    pub fn object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }
}

/// How one source's `sync` ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    Deleted,
    /// The backend no longer had it; counted as deleted.
    AlreadyGone,
    WouldDelete,
    Failed { error: String },
    /// The run was cancelled before this object was reached.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepEntry {
    pub kind: EntityKind,
    pub id: ObjectId,
    pub key: String,
    #[serde(flatten)]
    pub outcome: SweepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub aborted: bool,
    pub bootstrap: BTreeMap<EntityKind, LoadStats>,
    pub kinds: BTreeMap<EntityKind, KindTally>,
    pub sources: Vec<SourceOutcome>,
    pub errors: Vec<RunError>,
    pub sweep: Vec<SweepEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_skipped: Option<String>,
}

impl RunReport {
    pub fn deleted(&self) -> usize {
        self.sweep
            .iter()
            .filter(|e| matches!(e.outcome, SweepOutcome::Deleted | SweepOutcome::AlreadyGone))
            .count()
    }

    pub fn sweep_failures(&self) -> usize {
        self.sweep
            .iter()
            .filter(|e| matches!(e.outcome, SweepOutcome::Failed { .. }))
            .count()
    }

    /// No source failed, nothing errored, the sweep ran clean and the run was
    /// not aborted.
    pub fn is_clean(&self) -> bool {
        !self.aborted
            && self.errors.is_empty()
            && self.sources.iter().all(SourceOutcome::succeeded)
            && self.sweep_failures() == 0
    }

    pub fn tally(&self, kind: EntityKind) -> KindTally {
        self.kinds.get(&kind).copied().unwrap_or_default()
    }
}
