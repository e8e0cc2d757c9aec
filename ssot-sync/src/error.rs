//! Error types for ssot-sync.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use ssot_core::{EntityKind, KeyError, NaturalKey, ObjectId, PriorityError};

/// Failures reported by a [`RemoteClient`](crate::remote::RemoteClient).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The record does not exist (HTTP 404 or equivalent).
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: ObjectId },

    /// The backend answered with a non-success status.
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body was not the JSON we expected.
    #[error("cannot decode response: {0}")]
    Decode(String),
}

/// The remote operation an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    List,
    Create,
    Patch,
    Delete,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteOp::List => "list",
            RemoteOp::Create => "create",
            RemoteOp::Patch => "patch",
            RemoteOp::Delete => "delete",
        })
    }
}

/// All errors that can arise while reconciling.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The desired object has no usable natural key. Nothing was sent.
    #[error(transparent)]
    Validation(#[from] KeyError),

    #[error("{op} {kind} failed: {source}")]
    Remote {
        kind: EntityKind,
        op: RemoteOp,
        #[source]
        source: RemoteError,
    },

    /// A backend object could not be mapped to its typed form.
    #[error("cannot decode {kind}: {source}")]
    Decode {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },

    /// The backend returned an object without an id.
    #[error("{kind} {key} has no id")]
    MissingId { kind: EntityKind, key: NaturalKey },

    /// An earlier create of this key succeeded remotely but returned an
    /// unusable echo. Creating again would duplicate the record.
    #[error("{kind} {key} was created earlier this run but its echo could not be read")]
    Unconfirmed { kind: EntityKind, key: NaturalKey },

    #[error("{kind} with key {key} is already in the store")]
    DuplicateKey { kind: EntityKind, key: NaturalKey },

    #[error(transparent)]
    Priority(#[from] PriorityError),

    /// Listing a kind at startup failed; the run cannot proceed.
    #[error("bootstrap of {kind} failed: {source}")]
    Bootstrap {
        kind: EntityKind,
        #[source]
        source: RemoteError,
    },

    #[error("run cancelled")]
    Cancelled,
}

impl SyncError {
    /// Errors that abort the whole run rather than one object.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Priority(_) | SyncError::Bootstrap { .. } | SyncError::Cancelled
        )
    }

    /// Entity kind the error concerns, when there is one.
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            SyncError::Validation(KeyError::Missing { kind, .. })
            | SyncError::Validation(KeyError::Malformed { kind, .. })
            | SyncError::Remote { kind, .. }
            | SyncError::Decode { kind, .. }
            | SyncError::MissingId { kind, .. }
            | SyncError::Unconfirmed { kind, .. }
            | SyncError::DuplicateKey { kind, .. }
            | SyncError::Bootstrap { kind, .. } => Some(*kind),
            SyncError::Priority(_) | SyncError::Cancelled => None,
        }
    }
}

/// Errors a [`Source`](crate::source::Source) returns from `sync`.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source's input could not be parsed.
    #[error("cannot load {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Sync(e) if e.is_fatal())
    }
}

/// Convenience constructor for [`SourceError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.into(),
        source,
    }
}
