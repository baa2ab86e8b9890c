//! Staging of fetched datasets as NDJSON objects
//!
//! The [`Stager`] serializes a dataset to newline-delimited JSON and writes it
//! through an [`ObjectStore`] under a timestamp-qualified key, so two runs
//! never overwrite each other's staged objects.

use crate::error::{IngestError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use serde_json::Value;
use sha2::{Digest, Sha256};
use statsync_common::Dataset;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod local;
pub mod s3;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Content type attached to every staged object.
pub const NDJSON_CONTENT_TYPE: &str = "application/json";

/// Blob store that staged objects are written to
///
/// Implementations are bound to a single bucket (or directory) and return a
/// locator string the warehouse can read the object back from.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String>;
}

/// A successfully written staged object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedObject {
    pub key: String,
    pub locator: String,
    pub size_bytes: usize,
    pub sha256: String,
}

/// Object key for one endpoint's staged data:
/// `<source>_<logical_name>_data_<YYYYMMDD_HHMMSS>.json`
pub fn object_key<Tz>(source: &str, logical_name: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_{}_data_{}.json",
        source,
        logical_name,
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Encode records as NDJSON: one JSON value per line, no trailing newline
pub fn encode_ndjson(records: &[Value]) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push(b'\n');
        }
        serde_json::to_writer(&mut out, record)?;
    }
    Ok(out)
}

/// Encode an arbitrary value for staging
///
/// A sequence becomes NDJSON of its elements. Any other value is written as
/// its single JSON encoding.
pub fn encode_payload(value: &Value) -> serde_json::Result<Vec<u8>> {
    match value {
        Value::Array(items) => encode_ndjson(items),
        other => serde_json::to_vec(other),
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Writes datasets to an object store
#[derive(Clone)]
pub struct Stager {
    store: Arc<dyn ObjectStore>,
}

impl Stager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn bucket(&self) -> &str {
        self.store.bucket()
    }

    /// Serialize `dataset` as NDJSON and write it under `key`
    ///
    /// Store errors come back as [`IngestError::Store`]; nothing panics past
    /// this boundary.
    #[instrument(skip(self, dataset), fields(bucket = %self.store.bucket(), records = dataset.len()))]
    pub async fn stage(&self, dataset: &Dataset, key: &str) -> Result<StagedObject> {
        let body = encode_ndjson(dataset.records()).map_err(|e| IngestError::store(key, e))?;
        self.put(key, body).await
    }

    /// Stage a single value, using [`encode_payload`] rules
    pub async fn stage_value(&self, value: &Value, key: &str) -> Result<StagedObject> {
        let body = encode_payload(value).map_err(|e| IngestError::store(key, e))?;
        self.put(key, body).await
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<StagedObject> {
        let size_bytes = body.len();
        let sha256 = sha256_hex(&body);

        let locator = self
            .store
            .put_object(key, body, NDJSON_CONTENT_TYPE)
            .await?;

        info!(%locator, size_bytes, %sha256, "Staged object written");

        Ok(StagedObject {
            key: key.to_string(),
            locator,
            size_bytes,
            sha256,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        writes: Mutex<Vec<(String, Vec<u8>, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        fn bucket(&self) -> &str {
            "test-bucket"
        }

        async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
            if self.fail {
                return Err(IngestError::store(key, "access denied"));
            }
            self.writes
                .lock()
                .unwrap()
                .push((key.to_string(), body, content_type.to_string()));
            Ok(format!("mem://test-bucket/{}", key))
        }
    }

    #[test]
    fn test_object_key_format() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 1)
            .unwrap()
            .and_utc();
        assert_eq!(
            object_key("nba_api", "games", &at),
            "nba_api_games_data_20240307_090501.json"
        );
    }

    #[test]
    fn test_object_key_differs_across_seconds() {
        let a = Utc::now();
        let b = a + chrono::Duration::seconds(1);
        assert_ne!(object_key("s", "n", &a), object_key("s", "n", &b));
    }

    #[test]
    fn test_encode_ndjson_lines() {
        let body = encode_ndjson(&[json!({"ID": 1}), json!({"ID": 2})]).unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "{\"ID\":1}\n{\"ID\":2}");
    }

    #[test]
    fn test_encode_ndjson_empty() {
        assert!(encode_ndjson(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_encode_payload_single_object() {
        let body = encode_payload(&json!({"x": [1, 2]})).unwrap();
        assert_eq!(body, br#"{"x":[1,2]}"#.to_vec());
    }

    #[test]
    fn test_encode_payload_sequence() {
        let body = encode_payload(&json!([1, "a", null])).unwrap();
        assert_eq!(body, b"1\n\"a\"\nnull".to_vec());
    }

    #[tokio::test]
    async fn test_stage_writes_ndjson_with_json_content_type() {
        let store = Arc::new(RecordingStore::default());
        let stager = Stager::new(store.clone());
        let dataset = Dataset::from(vec![json!({"ID": 1}), json!({"ID": 2})]);

        let staged = stager.stage(&dataset, "k.json").await.unwrap();

        assert_eq!(staged.locator, "mem://test-bucket/k.json");
        assert_eq!(staged.size_bytes, 17);
        assert_eq!(staged.sha256.len(), 64);

        let writes = store.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1, b"{\"ID\":1}\n{\"ID\":2}".to_vec());
        assert_eq!(writes[0].2, NDJSON_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_stage_value_single_object() {
        let store = Arc::new(RecordingStore::default());
        let stager = Stager::new(store.clone());

        stager.stage_value(&json!({"x": 1}), "one.json").await.unwrap();

        let writes = store.writes.lock().unwrap();
        assert_eq!(writes[0].1, br#"{"x":1}"#.to_vec());
    }

    #[tokio::test]
    async fn test_stage_store_failure_is_reported() {
        let store = Arc::new(RecordingStore {
            fail: true,
            ..Default::default()
        });
        let stager = Stager::new(store);

        let err = stager
            .stage(&Dataset::from(vec![json!(1)]), "k.json")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Store);
    }
}
