//! Statsync Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch ingestion of a paginated JSON statistics API into a warehouse.
//!
//! For every configured endpoint the [`driver::RunDriver`]:
//!
//! 1. walks all pages with the [`source::SourceClient`]
//! 2. optionally lowercases record keys ([`normalize`])
//! 3. stages the records as NDJSON in an object store ([`stage`])
//! 4. loads the staged object into a table, replacing its contents ([`load`])
//!
//! # Example
//!
//! ```no_run
//! use statsync_ingest::{config::IngestConfig, driver::RunDriver};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(IngestConfig::from_env()?);
//!     let summary = RunDriver::from_config(config).await?.run().await;
//!     println!("{} endpoints loaded", summary.loaded());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod load;
pub mod normalize;
pub mod source;
pub mod stage;

pub use error::{FailureKind, IngestError, Result};
