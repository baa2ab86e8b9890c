//! Run driver: fetch, normalize, stage and load each configured endpoint
//!
//! Endpoints run one after another and independently. A failure at any
//! stage is logged, recorded in the [`RunSummary`], and the driver moves on
//! to the next endpoint.

use crate::config::{EndpointConfig, IngestConfig, StorageConfig};
use crate::error::{FailureKind, IngestError, Result};
use crate::load::{BigQueryWarehouse, Loader, Provisioner};
use crate::normalize::normalize_dataset;
use crate::source::SourceClient;
use crate::stage::{object_key, LocalObjectStore, ObjectStore, S3ObjectStore, Stager};
use chrono::Local;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Pipeline step an endpoint failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Stage,
    Load,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::Fetch => "fetch",
            Step::Stage => "stage",
            Step::Load => "load",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOutcome {
    Loaded { rows: u64, locator: String },
    /// The API returned no records; nothing was staged
    Empty,
    Failed {
        step: Step,
        kind: FailureKind,
        message: String,
    },
}

impl EndpointOutcome {
    fn failed(step: Step, err: &IngestError) -> Self {
        EndpointOutcome::Failed {
            step,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReport {
    pub name: String,
    pub table_id: String,
    pub outcome: EndpointOutcome,
}

/// Per-endpoint results of one run, in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub reports: Vec<EndpointReport>,
}

impl RunSummary {
    pub fn loaded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, EndpointOutcome::Loaded { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, EndpointOutcome::Failed { .. }))
            .count()
    }

    pub fn get(&self, name: &str) -> Option<&EndpointOutcome> {
        self.reports
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }
}

pub struct RunDriver {
    config: Arc<IngestConfig>,
    source: SourceClient,
    stager: Stager,
    loader: Loader,
    provisioner: Option<Arc<dyn Provisioner>>,
}

impl RunDriver {
    pub fn new(
        config: Arc<IngestConfig>,
        source: SourceClient,
        stager: Stager,
        loader: Loader,
    ) -> Self {
        Self {
            config,
            source,
            stager,
            loader,
            provisioner: None,
        }
    }

    /// Ensure the destination dataset exists before the first load
    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Wire the production backends described by `config`
    pub async fn from_config(config: Arc<IngestConfig>) -> Result<Self> {
        let source = SourceClient::new(&config.source)?;

        let store: Arc<dyn ObjectStore> = match &config.storage {
            StorageConfig::S3(s3) => Arc::new(S3ObjectStore::new(s3).await?),
            StorageConfig::Local { root } => Arc::new(LocalObjectStore::new(root.clone())),
        };

        let warehouse = Arc::new(BigQueryWarehouse::new(&config.warehouse)?);
        let loader = Loader::new(warehouse.clone(), config.warehouse.dataset_id.clone());

        Ok(Self::new(config, source, Stager::new(store), loader).with_provisioner(warehouse))
    }

    pub async fn run(&self) -> RunSummary {
        if let Some(provisioner) = &self.provisioner {
            let dataset = &self.config.warehouse.dataset_id;
            match provisioner
                .ensure_dataset(dataset, &self.config.warehouse.location)
                .await
            {
                Ok(status) => info!(dataset = %dataset, ?status, "Destination dataset ready"),
                Err(e) => error!(dataset = %dataset, error = %e, "Could not ensure destination dataset"),
            }
        }

        let mut summary = RunSummary::default();
        for endpoint in &self.config.endpoints {
            let span = info_span!("endpoint", name = %endpoint.name, table = %endpoint.table_id);
            let outcome = self.run_endpoint(endpoint).instrument(span).await;
            summary.reports.push(EndpointReport {
                name: endpoint.name.clone(),
                table_id: endpoint.table_id.clone(),
                outcome,
            });
        }

        info!(
            endpoints = summary.reports.len(),
            loaded = summary.loaded(),
            failed = summary.failed(),
            "All ingestion attempts complete"
        );
        summary
    }

    async fn run_endpoint(&self, endpoint: &EndpointConfig) -> EndpointOutcome {
        info!(path = %endpoint.path, "Processing endpoint");

        let dataset = match self.source.fetch(&endpoint.path, &endpoint.params).await {
            Ok(dataset) if dataset.is_empty() => {
                warn!("No records returned; skipping");
                return EndpointOutcome::Empty;
            },
            Ok(dataset) => dataset,
            Err(e) => {
                error!(kind = %e.kind(), error = %e, "Fetch failed; skipping");
                return EndpointOutcome::failed(Step::Fetch, &e);
            },
        };

        let dataset = if endpoint.normalize_keys {
            info!(records = dataset.len(), "Lowercasing record keys");
            normalize_dataset(&dataset)
        } else {
            dataset
        };

        let key = object_key(&self.config.source.source_name, &endpoint.name, &Local::now());
        let staged = match self.stager.stage(&dataset, &key).await {
            Ok(staged) => staged,
            Err(e) => {
                error!(%key, error = %e, "Staging failed; skipping load");
                return EndpointOutcome::failed(Step::Stage, &e);
            },
        };

        match self.loader.load(&staged.locator, &endpoint.table_id).await {
            Ok(rows) => {
                info!(
                    rows,
                    dataset = %self.loader.dataset_id(),
                    "Endpoint ingested"
                );
                EndpointOutcome::Loaded {
                    rows,
                    locator: staged.locator,
                }
            },
            Err(e) => {
                error!(locator = %staged.locator, error = %e, "Load failed");
                EndpointOutcome::failed(Step::Load, &e)
            },
        }
    }
}
