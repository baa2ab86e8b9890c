//! BigQuery REST backend
//!
//! Load jobs are inserted with a client-generated job id and then polled
//! until BigQuery reports `DONE`. The bearer token is supplied by the caller;
//! obtaining it is outside this crate.

use super::{DatasetStatus, LoadJob, Provisioner, Warehouse};
use crate::config::WarehouseConfig;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const JOB_STATE_DONE: &str = "DONE";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: Option<JobReference>,
    status: JobStatus,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

impl std::fmt::Display for ErrorProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.reason.as_deref().unwrap_or("error"),
            self.message.as_deref().unwrap_or("no message")
        )
    }
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    /// int64 values are string-encoded in the REST API
    output_rows: Option<String>,
}

impl JobResource {
    fn is_done(&self) -> bool {
        self.status.state == JOB_STATE_DONE
    }

    fn output_rows(&self) -> Option<u64> {
        self.statistics
            .as_ref()?
            .load
            .as_ref()?
            .output_rows
            .as_deref()?
            .parse()
            .ok()
    }
}

/// BigQuery client for load jobs and dataset provisioning
#[derive(Clone)]
pub struct BigQueryWarehouse {
    client: Client,
    api_base_url: String,
    project_id: String,
    location: String,
    access_token: Option<String>,
    poll_interval: Duration,
}

impl BigQueryWarehouse {
    pub fn new(config: &WarehouseConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| IngestError::config(format!("Failed to build HTTP client: {}", e)))?;

        if config.access_token.is_none() {
            warn!("No warehouse access token configured; requests will be unauthenticated");
        }

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            access_token: config.access_token.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    fn project_url(&self) -> String {
        format!("{}/bigquery/v2/projects/{}", self.api_base_url, self.project_id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a job request and decode the job resource, mapping every failure
    /// to a load error for `table`
    async fn job_call(&self, builder: RequestBuilder, table: &str) -> Result<JobResource> {
        let response = builder
            .send()
            .await
            .map_err(|e| IngestError::load(table, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::load(
                table,
                format!("HTTP {}: {}", status, body),
            ));
        }

        response
            .json::<JobResource>()
            .await
            .map_err(|e| IngestError::load(table, format!("Unreadable job resource: {}", e)))
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    #[instrument(skip(self, job), fields(destination = %job.destination(), source = %job.source_uri))]
    async fn run_load_job(&self, job: &LoadJob) -> Result<u64> {
        let table = job.destination();
        let job_id = format!("statsync_load_{}", Uuid::new_v4().simple());

        let body = json!({
            "jobReference": {
                "projectId": self.project_id,
                "jobId": job_id,
                "location": self.location,
            },
            "configuration": {
                "load": {
                    "sourceUris": [job.source_uri],
                    "destinationTable": {
                        "projectId": self.project_id,
                        "datasetId": job.dataset_id,
                        "tableId": job.table_id,
                    },
                    "sourceFormat": job.source_format.as_str(),
                    "autodetect": job.autodetect,
                    "writeDisposition": job.write_disposition.as_str(),
                }
            }
        });

        let url = format!("{}/jobs", self.project_url());
        let mut resource = self
            .job_call(self.request(Method::POST, &url).json(&body), &table)
            .await?;

        let (job_id, location) = match &resource.job_reference {
            Some(reference) => (
                reference.job_id.clone(),
                reference
                    .location
                    .clone()
                    .unwrap_or_else(|| self.location.clone()),
            ),
            None => (job_id, self.location.clone()),
        };
        info!(%job_id, "Load job submitted");

        let poll_url = format!("{}/jobs/{}", self.project_url(), job_id);
        while !resource.is_done() {
            debug!(%job_id, state = %resource.status.state, "Waiting for load job");
            tokio::time::sleep(self.poll_interval).await;
            resource = self
                .job_call(
                    self.request(Method::GET, &poll_url)
                        .query(&[("location", location.as_str())]),
                    &table,
                )
                .await?;
        }

        if let Some(error) = &resource.status.error_result {
            let details: Vec<String> = resource.status.errors.iter().map(|e| e.to_string()).collect();
            return Err(IngestError::load(
                &table,
                if details.is_empty() {
                    error.to_string()
                } else {
                    format!("{} ({})", error, details.join("; "))
                },
            ));
        }

        resource
            .output_rows()
            .ok_or_else(|| IngestError::load(&table, "Job finished without load statistics"))
    }
}

#[async_trait]
impl Provisioner for BigQueryWarehouse {
    #[instrument(skip(self))]
    async fn ensure_dataset(&self, dataset_id: &str, location: &str) -> Result<DatasetStatus> {
        let provision_err = |message: String| IngestError::Provision {
            dataset: dataset_id.to_string(),
            message,
        };

        let url = format!("{}/datasets/{}", self.project_url(), dataset_id);
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| provision_err(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                info!(dataset_id, "Dataset already exists");
                return Ok(DatasetStatus::Existing);
            },
            StatusCode::NOT_FOUND => {},
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(provision_err(format!("HTTP {}: {}", status, body)));
            },
        }

        let body = json!({
            "datasetReference": {
                "projectId": self.project_id,
                "datasetId": dataset_id,
            },
            "location": location,
        });
        let response = self
            .request(Method::POST, &format!("{}/datasets", self.project_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| provision_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(provision_err(format!("HTTP {}: {}", status, body)));
        }

        info!(dataset_id, location, "Dataset created");
        Ok(DatasetStatus::Created)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_output_rows_parsed_from_string() {
        let resource: JobResource = serde_json::from_value(json!({
            "status": {"state": "DONE"},
            "statistics": {"load": {"outputRows": "1234"}}
        }))
        .unwrap();
        assert!(resource.is_done());
        assert_eq!(resource.output_rows(), Some(1234));
    }

    #[test]
    fn test_running_job_without_statistics() {
        let resource: JobResource = serde_json::from_value(json!({
            "jobReference": {"jobId": "j1"},
            "status": {"state": "RUNNING"}
        }))
        .unwrap();
        assert!(!resource.is_done());
        assert_eq!(resource.output_rows(), None);
        assert_eq!(resource.job_reference.unwrap().job_id, "j1");
    }

    #[test]
    fn test_error_proto_display() {
        let error = ErrorProto {
            reason: Some("invalid".to_string()),
            message: None,
        };
        assert_eq!(error.to_string(), "invalid: no message");
    }
}
