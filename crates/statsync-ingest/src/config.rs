//! Configuration management
//!
//! All settings are read once at startup into an immutable [`IngestConfig`]
//! that is handed to the run driver. Nothing here is mutated afterwards.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Base URL of the statistics API.
pub const DEFAULT_SOURCE_BASE_URL: &str = "https://api.server.nbaapi.com";

/// Source name used as the first segment of staged object keys.
pub const DEFAULT_SOURCE_NAME: &str = "nba_api";

pub const DEFAULT_USER_AGENT: &str = concat!("statsync-ingest/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_S3_REGION: &str = "us-east-1";

pub const DEFAULT_S3_BUCKET: &str = "statsync-staging";

/// Scheme used when rendering object locators handed to the warehouse.
/// `gs` matches a bucket served through the GCS interoperability endpoint.
pub const DEFAULT_LOCATOR_SCHEME: &str = "gs";

/// S3-compatible endpoint used for `gs` locators when `S3_ENDPOINT` is unset.
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Warehouse dataset that receives every table.
pub const DEFAULT_DATASET_ID: &str = "nba_raw_data";

pub const DEFAULT_DATASET_LOCATION: &str = "US";

pub const DEFAULT_WAREHOUSE_API_URL: &str = "https://bigquery.googleapis.com";

/// Delay between load job status polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Complete, validated configuration for one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub source: SourceConfig,
    pub storage: StorageConfig,
    pub warehouse: WarehouseConfig,
    pub endpoints: Vec<EndpointConfig>,
}

/// Statistics API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub source_name: String,
    pub user_agent: String,
}

/// Where staged NDJSON objects are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    S3(S3Config),
    /// Local directory, mainly for development runs
    Local { root: PathBuf },
}

#[derive(Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Static credentials; when absent the default AWS provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
    pub locator_scheme: String,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("static_credentials", &self.access_key.is_some())
            .field("path_style", &self.path_style)
            .field("locator_scheme", &self.locator_scheme)
            .finish()
    }
}

/// Warehouse (BigQuery REST) settings
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub location: String,
    pub api_base_url: String,
    /// OAuth bearer token obtained by the caller's credential tooling
    pub access_token: Option<String>,
    pub poll_interval_ms: u64,
}

impl std::fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("project_id", &self.project_id)
            .field("dataset_id", &self.dataset_id)
            .field("location", &self.location)
            .field("api_base_url", &self.api_base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

/// One API endpoint and the table it lands in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Logical name, used in object keys and log lines
    pub name: String,
    /// Path appended to the source base URL, e.g. `/api/games`
    pub path: String,
    pub table_id: String,
    /// Lowercase every mapping key before staging
    #[serde(default)]
    pub normalize_keys: bool,
    /// Extra query parameters sent with every page request
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl EndpointConfig {
    pub fn new(name: &str, path: &str, table_id: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            table_id: table_id.to_string(),
            normalize_keys: false,
            params: BTreeMap::new(),
        }
    }

    pub fn with_normalized_keys(mut self) -> Self {
        self.normalize_keys = true;
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }
}

/// The four statistics feeds landed by default
pub fn default_endpoints() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig::new("games", "/api/games", "api_games_raw"),
        EndpointConfig::new("playertotals", "/api/playertotals", "api_playertotals_raw"),
        EndpointConfig::new(
            "playeradvancedstats",
            "/api/playeradvancedstats",
            "api_playeradvancedstats_raw",
        ),
        // Shot chart rows arrive with mixed-case keys
        EndpointConfig::new(
            "playershotchart",
            "/api/playershotchart",
            "api_playershotchart_raw",
        )
        .with_normalized_keys(),
    ]
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_var(key).unwrap_or_else(|| default.to_string())
}

fn env_flag(key: &str, default: bool) -> Result<bool> {
    let Some(raw) = env_var(key) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(IngestError::config(format!(
            "Invalid boolean for {}: {}",
            key, raw
        ))),
    }
}

impl IngestConfig {
    /// Load configuration from `.env`, the environment and defaults
    ///
    /// Environment variables:
    /// - `STATSYNC_SOURCE_BASE_URL`, `STATSYNC_SOURCE_NAME`, `STATSYNC_USER_AGENT`
    /// - `STATSYNC_STAGING_DIR`: use the local directory backend instead of S3
    /// - `S3_ENDPOINT`, `S3_REGION`, `S3_BUCKET`, `S3_ACCESS_KEY`, `S3_SECRET_KEY`,
    ///   `S3_PATH_STYLE`, `STATSYNC_LOCATOR_SCHEME`
    /// - `STATSYNC_WAREHOUSE_PROJECT_ID` (or `GOOGLE_CLOUD_PROJECT`),
    ///   `STATSYNC_WAREHOUSE_DATASET_ID`, `STATSYNC_WAREHOUSE_LOCATION`,
    ///   `STATSYNC_WAREHOUSE_API_URL`, `STATSYNC_WAREHOUSE_ACCESS_TOKEN`
    ///   (or `GOOGLE_OAUTH_ACCESS_TOKEN`), `STATSYNC_WAREHOUSE_POLL_INTERVAL_MS`
    /// - `STATSYNC_ENDPOINTS_FILE`: JSON array of endpoint definitions
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let source = SourceConfig {
            base_url: env_or("STATSYNC_SOURCE_BASE_URL", DEFAULT_SOURCE_BASE_URL),
            source_name: env_or("STATSYNC_SOURCE_NAME", DEFAULT_SOURCE_NAME),
            user_agent: env_or("STATSYNC_USER_AGENT", DEFAULT_USER_AGENT),
        };

        let storage = match env_var("STATSYNC_STAGING_DIR") {
            Some(dir) => StorageConfig::Local {
                root: PathBuf::from(dir),
            },
            None => {
                let locator_scheme = env_or("STATSYNC_LOCATOR_SCHEME", DEFAULT_LOCATOR_SCHEME);
                // gs:// locators must name objects written through the GCS endpoint
                let endpoint = env_var("S3_ENDPOINT").or_else(|| {
                    (locator_scheme == "gs").then(|| DEFAULT_GCS_ENDPOINT.to_string())
                });
                StorageConfig::S3(S3Config {
                    endpoint,
                    region: env_or("S3_REGION", DEFAULT_S3_REGION),
                    bucket: env_or("S3_BUCKET", DEFAULT_S3_BUCKET),
                    access_key: env_var("S3_ACCESS_KEY")
                        .or_else(|| env_var("AWS_ACCESS_KEY_ID")),
                    secret_key: env_var("S3_SECRET_KEY")
                        .or_else(|| env_var("AWS_SECRET_ACCESS_KEY")),
                    path_style: env_flag("S3_PATH_STYLE", false)?,
                    locator_scheme,
                })
            },
        };

        let warehouse = WarehouseConfig {
            project_id: env_var("STATSYNC_WAREHOUSE_PROJECT_ID")
                .or_else(|| env_var("GOOGLE_CLOUD_PROJECT"))
                .unwrap_or_default(),
            dataset_id: env_or("STATSYNC_WAREHOUSE_DATASET_ID", DEFAULT_DATASET_ID),
            location: env_or("STATSYNC_WAREHOUSE_LOCATION", DEFAULT_DATASET_LOCATION),
            api_base_url: env_or("STATSYNC_WAREHOUSE_API_URL", DEFAULT_WAREHOUSE_API_URL),
            access_token: env_var("STATSYNC_WAREHOUSE_ACCESS_TOKEN")
                .or_else(|| env_var("GOOGLE_OAUTH_ACCESS_TOKEN")),
            poll_interval_ms: env_var("STATSYNC_WAREHOUSE_POLL_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        };

        let endpoints = match env_var("STATSYNC_ENDPOINTS_FILE") {
            Some(path) => load_endpoints_file(Path::new(&path))?,
            None => default_endpoints(),
        };

        let config = IngestConfig {
            source,
            storage,
            warehouse,
            endpoints,
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.base_url.trim().is_empty() {
            return Err(IngestError::config("Source base URL cannot be empty"));
        }

        match &self.storage {
            StorageConfig::S3(s3) => {
                if s3.bucket.trim().is_empty() {
                    return Err(IngestError::config("S3 bucket cannot be empty"));
                }
                if s3.access_key.is_some() != s3.secret_key.is_some() {
                    return Err(IngestError::config(
                        "S3 access key and secret key must be set together",
                    ));
                }
                if s3.locator_scheme == "gs" && s3.endpoint.is_none() {
                    return Err(IngestError::config(
                        "gs locators need an S3 endpoint (e.g. https://storage.googleapis.com)",
                    ));
                }
            },
            StorageConfig::Local { root } => {
                if root.as_os_str().is_empty() {
                    return Err(IngestError::config("Staging directory cannot be empty"));
                }
            },
        }

        if self.warehouse.project_id.trim().is_empty() {
            return Err(IngestError::config(
                "Warehouse project id is required (STATSYNC_WAREHOUSE_PROJECT_ID)",
            ));
        }
        if self.warehouse.dataset_id.trim().is_empty() {
            return Err(IngestError::config("Warehouse dataset id cannot be empty"));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(IngestError::config(format!(
                    "Endpoint '{}' path must start with '/': {}",
                    endpoint.name, endpoint.path
                )));
            }
            if endpoint.table_id.trim().is_empty() {
                return Err(IngestError::config(format!(
                    "Endpoint '{}' has no table id",
                    endpoint.name
                )));
            }
            if !seen.insert(endpoint.name.as_str()) {
                return Err(IngestError::config(format!(
                    "Duplicate endpoint name: {}",
                    endpoint.name
                )));
            }
        }

        Ok(())
    }

    /// Keep only the endpoints whose names appear in `names`
    ///
    /// An empty filter keeps everything. Unknown names are a configuration error.
    pub fn restrict_to(&self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self.clone());
        }

        if let Some(unknown) = names
            .iter()
            .find(|n| !self.endpoints.iter().any(|e| &e.name == *n))
        {
            return Err(IngestError::config(format!("Unknown endpoint: {}", unknown)));
        }

        let mut config = self.clone();
        config.endpoints.retain(|e| names.contains(&e.name));
        Ok(config)
    }
}

fn load_endpoints_file(path: &Path) -> Result<Vec<EndpointConfig>> {
    let content = std::fs::read_to_string(path)
        .map_err(statsync_common::CommonError::from)?;
    let endpoints = serde_json::from_str(&content).map_err(|e| {
        IngestError::config(format!(
            "Invalid endpoints file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(endpoints)
}
