//! Error types for ssot-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::EntityKind;

/// A desired or remote object whose natural key cannot be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// A field that participates in the natural key is empty or absent.
    #[error("{kind}: missing required key field `{field}`")]
    Missing {
        kind: EntityKind,
        field: &'static str,
    },

    /// A key field is present but does not parse.
    #[error("{kind}: malformed key field `{field}` ({value:?}): {reason}")]
    Malformed {
        kind: EntityKind,
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Problems with the source-priority table or with a source that is not in it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriorityError {
    #[error("source priority table contains an empty source name")]
    EmptyName,

    #[error("source `{0}` appears more than once in the priority table")]
    Duplicate(String),

    /// An object was submitted on behalf of a source the table does not rank.
    #[error("source `{0}` has no entry in the priority table")]
    UnknownSource(String),
}

/// All errors that can arise from loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error, with the file path; serde_yaml adds line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config file not found at {path}")]
    NotFound { path: PathBuf },

    /// `dirs::config_dir()` returned `None`.
    #[error("cannot determine the user config directory; pass --config explicitly")]
    ConfigDirNotFound,

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("source priority: {0}")]
    Priority(#[from] PriorityError),
}
