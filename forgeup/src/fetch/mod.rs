//! Asset fetching.
//!
//! # Architecture
//!
//! ```text
//! FetchEngine (bounded by the fetch limiter, retried per item)
//!         │
//!         └── FallbackTransport
//!                 ├── ExternalDownloader   (aria2c, primary)
//!                 └── HttpStreamTransport  (reqwest stream, secondary)
//!                         └── Authorizer   (bearer token for gated hosts)
//! ```
//!
//! Items whose destination already holds a non-empty file are skipped
//! before any transfer starts.

mod auth;
mod engine;
mod error;
mod external;
pub mod filename;
mod http;
mod state;
mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::Authorizer;
pub use engine::FetchEngine;
pub use error::FetchError;
pub use external::ExternalDownloader;
pub use http::HttpStreamTransport;
pub use state::{is_materialized, FetchOutcome, FetchResult, Transferred, WorkItem, WorkStatus};
pub use strategy::{FallbackTransport, Transport};
