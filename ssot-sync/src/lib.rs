//! # ssot-sync
//!
//! The reconciliation engine: Canonical Store, Diff Engine, Orphan Tracker
//! and Upsert Pipeline, plus the remote-client and source seams.
//!
//! Build a [`Reconciler`] with [`Reconciler::bootstrap`], hand it to every
//! [`Source`] through [`Reconciler::run`], and read the [`RunReport`].

pub mod diff;
pub mod error;
pub mod memory;
pub mod orphans;
pub mod pipeline;
pub mod remote;
pub mod report;
pub mod source;
pub mod store;

pub use diff::{FieldDiff, Origin};
pub use error::{RemoteError, RemoteOp, SourceError, SyncError};
pub use memory::MemoryRemote;
pub use pipeline::{Action, Reconciler, ReconcilerOptions, Upserted};
pub use remote::RemoteClient;
pub use report::{KindTally, RunError, RunReport, SourceOutcome, SweepEntry, SweepOutcome};
pub use source::Source;
pub use store::{CanonicalStore, KindOps, KindStore, LoadStats, Stored};
