//! The connector seam: anything that can submit desired objects.

use async_trait::async_trait;

use ssot_core::SourceName;

use crate::error::SourceError;
use crate::pipeline::Reconciler;

/// A source of desired state.
///
/// `sync` submits every object the source currently reports through
/// [`Reconciler::upsert`]. Objects it does not submit become deletion
/// candidates. Per-object failures are recorded by the reconciler and need
/// not fail the source; returning `Err` marks the whole source as failed,
/// which skips the sweep.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &SourceName;

    async fn sync(&self, reconciler: &Reconciler) -> Result<(), SourceError>;
}
