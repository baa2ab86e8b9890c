//! Failure taxonomy for one endpoint's ingestion run
//!
//! Every failure is local to the endpoint being processed. The run driver
//! logs it and moves on to the next endpoint.

use thiserror::Error;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Connection-level failure talking to an HTTP API
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP API answered with a non-2xx status
    #[error("Request to {url} returned HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Response body was not valid JSON
    #[error("Response from {url} is not valid JSON: {message}")]
    Parse { url: String, message: String },

    /// Writing the staged object failed
    #[error("Object store write failed for {key}: {message}")]
    Store { key: String, message: String },

    /// Warehouse load job failed or could not be tracked
    #[error("Load into {table} failed: {message}")]
    Load { table: String, message: String },

    /// Destination dataset could not be checked or created
    #[error("Provisioning dataset {dataset} failed: {message}")]
    Provision { dataset: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] statsync_common::CommonError),
}

/// Coarse classification used in logs and run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Parse,
    Store,
    Load,
    Provision,
    Config,
}

impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::Transport { .. } | IngestError::HttpStatus { .. } => {
                FailureKind::Transport
            },
            IngestError::Parse { .. } => FailureKind::Parse,
            IngestError::Store { .. } => FailureKind::Store,
            IngestError::Load { .. } => FailureKind::Load,
            IngestError::Provision { .. } => FailureKind::Provision,
            IngestError::Config(_) | IngestError::Common(_) => FailureKind::Config,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        IngestError::Config(msg.into())
    }

    pub(crate) fn store(key: &str, err: impl std::fmt::Display) -> Self {
        IngestError::Store {
            key: key.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn load(table: &str, err: impl std::fmt::Display) -> Self {
        IngestError::Load {
            table: table.to_string(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Transport => "transport",
            FailureKind::Parse => "parse",
            FailureKind::Store => "store",
            FailureKind::Load => "load",
            FailureKind::Provision => "provision",
            FailureKind::Config => "config",
        };
        f.write_str(name)
    }
}
