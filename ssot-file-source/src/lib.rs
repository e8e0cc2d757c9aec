//! # ssot-file-source
//!
//! A [`Source`](ssot_sync::Source) that reads desired state from a YAML
//! document. See [`document`] for the format.

pub mod document;
pub mod source;

pub use document::Document;
pub use source::FileSource;
