//! # ssot-netbox
//!
//! [`RemoteClient`](ssot_sync::RemoteClient) for the NetBox REST API.
//!
//! Requests are blocking `ureq` calls run on tokio's blocking pool. Lists
//! follow the `next` link until exhausted and retry transient failures;
//! writes are never retried.

pub mod client;

pub use client::NetboxClient;
