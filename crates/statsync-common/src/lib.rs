//! Statsync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared record types, error handling and logging for the statsync
//! workspace.
//!
//! - **Types**: [`Record`] and [`Dataset`], the in-memory shape of one
//!   endpoint's fetched data
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use statsync_common::logging::{init_logging, LogConfig};
//! use statsync_common::Dataset;
//!
//! fn main() -> statsync_common::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let mut dataset = Dataset::new();
//!     dataset.extend(vec![serde_json::json!({"id": 1})]);
//!     tracing::info!(records = dataset.len(), "Dataset ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::{Dataset, Record};
