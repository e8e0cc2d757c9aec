//! The seam between the engine and the backend.

use async_trait::async_trait;
use serde_json::Value;

use ssot_core::{EntityKind, ObjectId};

use crate::diff::FieldDiff;
use crate::error::RemoteError;

/// Per-object CRUD against the backend, in untyped JSON.
///
/// Objects travel in the backend's wire form: references as bare ids on
/// writes, possibly nested objects on reads. Implementations must be safe to
/// call from many tasks at once.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Every object of `kind`. Pagination is the implementation's concern.
    async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, RemoteError>;

    /// Create one object and return the backend's full echo, including its id.
    async fn create(&self, kind: EntityKind, body: &Value) -> Result<Value, RemoteError>;

    /// Apply a partial update and return the full updated object.
    async fn patch(
        &self,
        kind: EntityKind,
        id: ObjectId,
        diff: &FieldDiff,
    ) -> Result<Value, RemoteError>;

    /// Delete one object. A missing record is [`RemoteError::NotFound`].
    async fn delete(&self, kind: EntityKind, id: ObjectId) -> Result<(), RemoteError>;
}
