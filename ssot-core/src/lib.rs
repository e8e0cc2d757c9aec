//! ssot core library: entity kinds, typed objects, natural keys, the source
//! priority table, configuration and errors.
//!
//! - [`types`]: ids, source names, kinds and descriptors, natural keys
//! - [`entity`]: the [`Entity`] trait
//! - [`objects`]: one typed struct per kind
//! - [`priority`]: [`SourcePriority`]
//! - [`config`]: YAML config load and validation
//! - [`error`]: [`KeyError`], [`PriorityError`], [`ConfigError`]

pub mod config;
pub mod entity;
pub mod error;
pub mod objects;
pub mod priority;
pub mod slug;
pub mod types;
pub mod wire;

pub use config::{Config, SourceConfig, SourceKind, SweepScope};
pub use entity::Entity;
pub use error::{ConfigError, KeyError, PriorityError};
pub use priority::SourcePriority;
pub use types::{
    BaseRecord, EntityKind, KindDescriptor, NaturalKey, ObjectId, SourceName, SOURCE_FIELD,
};
