//! Warehouse loading of staged objects
//!
//! A load always reads NDJSON, lets the warehouse detect the schema, and
//! replaces the destination table's contents. Whether the replacement is
//! atomic is up to the warehouse job semantics.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod bigquery;

pub use bigquery::BigQueryWarehouse;

/// Format of the staged source object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    NewlineDelimitedJson,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::NewlineDelimitedJson => "NEWLINE_DELIMITED_JSON",
        }
    }
}

/// What happens to rows already in the destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    /// Replace the table's prior contents entirely
    WriteTruncate,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::WriteTruncate => "WRITE_TRUNCATE",
        }
    }
}

/// One load job request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJob {
    pub source_uri: String,
    pub dataset_id: String,
    pub table_id: String,
    pub source_format: SourceFormat,
    pub autodetect: bool,
    pub write_disposition: WriteDisposition,
}

impl LoadJob {
    /// NDJSON, auto-detected schema, replace semantics
    pub fn replace_from_ndjson(source_uri: &str, dataset_id: &str, table_id: &str) -> Self {
        Self {
            source_uri: source_uri.to_string(),
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string(),
            source_format: SourceFormat::NewlineDelimitedJson,
            autodetect: true,
            write_disposition: WriteDisposition::WriteTruncate,
        }
    }

    pub fn destination(&self) -> String {
        format!("{}.{}", self.dataset_id, self.table_id)
    }
}

/// Warehouse that can run load jobs to completion
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Submit `job` and wait until it reaches a terminal state
    ///
    /// Returns the number of rows written.
    async fn run_load_job(&self, job: &LoadJob) -> Result<u64>;
}

/// Outcome of making sure the destination dataset exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetStatus {
    Existing,
    Created,
}

/// Creates warehouse datasets ahead of the first load
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn ensure_dataset(&self, dataset_id: &str, location: &str) -> Result<DatasetStatus>;
}

/// Loads staged objects into tables of one dataset
#[derive(Clone)]
pub struct Loader {
    warehouse: Arc<dyn Warehouse>,
    dataset_id: String,
}

impl Loader {
    pub fn new(warehouse: Arc<dyn Warehouse>, dataset_id: impl Into<String>) -> Self {
        Self {
            warehouse,
            dataset_id: dataset_id.into(),
        }
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    #[instrument(skip(self), fields(dataset = %self.dataset_id))]
    pub async fn load(&self, locator: &str, table_id: &str) -> Result<u64> {
        let job = LoadJob::replace_from_ndjson(locator, &self.dataset_id, table_id);
        let rows = self.warehouse.run_load_job(&job).await?;
        info!(destination = %job.destination(), rows, "Load job completed");
        Ok(rows)
    }
}
