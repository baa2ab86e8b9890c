//! Paginated client for the statistics API
//!
//! [`SourceClient::fetch`] walks every page of an endpoint and returns the
//! records of all pages as one [`Dataset`]. Any failure on any page aborts the
//! walk and discards the pages already fetched.

use crate::config::SourceConfig;
use crate::error::{IngestError, Result};
use reqwest::Client;
use serde_json::Value;
use statsync_common::Dataset;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Characters of an unparseable body included in the error log.
const BODY_PREVIEW_CHARS: usize = 500;

/// How the records of one page are laid out in its body
#[derive(Debug, PartialEq)]
pub enum PageShape {
    /// `{"data": [...], ...}`
    DataList(Vec<Value>),
    /// `[...]`
    BareList(Vec<Value>),
    /// Anything else: one object (or scalar) with no list to unpack
    Single(Value),
}

impl PageShape {
    pub fn from_body(body: Value) -> Self {
        match body {
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(items)) => PageShape::DataList(items),
                Some(other) => {
                    map.insert("data".to_string(), other);
                    PageShape::Single(Value::Object(map))
                },
                None => PageShape::Single(Value::Object(map)),
            },
            Value::Array(items) => PageShape::BareList(items),
            other => PageShape::Single(other),
        }
    }
}

/// Server-reported position within a paginated result
///
/// Both fields keep whatever JSON number the server sent, so `3.0` and `3`
/// compare the same.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pagination {
    pub page: f64,
    pub pages: f64,
}

impl Pagination {
    /// Read `pagination.page` / `pagination.pages` from a response body
    ///
    /// Returns `None` when the body carries no pagination mapping, which
    /// marks the response as the only page. A missing or non-numeric `page`
    /// counts as 1 and a missing or non-numeric `pages` as equal to `page`.
    pub fn from_body(body: &Value) -> Option<Self> {
        let meta = body.get("pagination")?.as_object()?;
        let page = number_field(meta, "page").unwrap_or(1.0);
        let pages = number_field(meta, "pages").unwrap_or(page);
        Some(Self { page, pages })
    }

    pub fn has_more(&self) -> bool {
        self.page < self.pages
    }
}

fn number_field(meta: &serde_json::Map<String, Value>, field: &str) -> Option<f64> {
    let value = meta.get(field)?;
    let number = value.as_f64();
    if number.is_none() {
        warn!(field, %value, "Pagination field is not a number; using default");
    }
    number
}

/// HTTP client bound to one API base URL
#[derive(Clone)]
pub struct SourceClient {
    client: Client,
    base_url: String,
}

impl SourceClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| IngestError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch every page of `endpoint`
    ///
    /// An empty dataset is a valid outcome and distinct from an error. There
    /// is no cap on the number of pages: the loop ends only when the server
    /// reports the last page or omits pagination metadata.
    #[instrument(skip(self, params), fields(url = tracing::field::Empty))]
    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Dataset> {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::Span::current().record("url", url.as_str());

        let mut dataset = Dataset::new();
        let mut page: u64 = 1;

        loop {
            let body = self.fetch_page(&url, params, page).await?;
            let pagination = Pagination::from_body(&body);

            match PageShape::from_body(body) {
                PageShape::DataList(records) | PageShape::BareList(records) => {
                    debug!(page, records = records.len(), "Page received");
                    dataset.extend(records);
                },
                PageShape::Single(record) if page == 1 && dataset.is_empty() => {
                    warn!(
                        page,
                        "Response has no 'data' list; keeping the whole body as a single record"
                    );
                    dataset.push(record);
                },
                PageShape::Single(_) => {
                    debug!(page, "Page has no record list; nothing appended");
                },
            }

            match pagination {
                Some(p) if p.has_more() => {
                    debug!(page = p.page, pages = p.pages, "More pages reported");
                    page += 1;
                },
                _ => break,
            }
        }

        info!(records = dataset.len(), pages = page, "Fetched all pages");
        Ok(dataset)
    }

    async fn fetch_page(
        &self,
        url: &str,
        params: &BTreeMap<String, String>,
        page: u64,
    ) -> Result<Value> {
        let mut query = params.clone();
        query.insert("page".to_string(), page.to_string());

        debug!(url, ?query, "Calling source API");

        let response = self
            .client
            .get(url)
            .query(&query)
            .send()
            .await
            .map_err(|source| IngestError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let text = response.text().await.map_err(|source| IngestError::Transport {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(BODY_PREVIEW_CHARS).collect();
            warn!(url, page, body = %preview, "Response is not valid JSON");
            IngestError::Parse {
                url: url.to_string(),
                message: e.to_string(),
            }
        })
    }
}
