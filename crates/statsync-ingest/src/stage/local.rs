//! Local directory object store for development runs

use super::ObjectStore;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes staged objects as files under a root directory
///
/// Locators are `file://` URIs. Content type is not persisted.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    name: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root.display().to_string();
        Self { root, name }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> &str {
        &self.name
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IngestError::store(key, e))?;
        }

        debug!(path = %path.display(), bytes = body.len(), content_type, "Writing staged file");
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| IngestError::store(key, e))?;

        let absolute = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| IngestError::store(key, e))?;
        Ok(format!("file://{}", absolute.display()))
    }
}
