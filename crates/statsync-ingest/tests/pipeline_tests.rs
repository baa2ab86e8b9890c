//! End-to-end run driver tests
//!
//! The source API is a wiremock server, staging goes to a temporary
//! directory and the warehouse is an in-process fake that records jobs.

use async_trait::async_trait;
use serde_json::{json, Value};
use statsync_ingest::config::{
    EndpointConfig, IngestConfig, SourceConfig, StorageConfig, WarehouseConfig,
};
use statsync_ingest::driver::{EndpointOutcome, RunDriver, Step};
use statsync_ingest::load::{DatasetStatus, LoadJob, Loader, Provisioner, Warehouse};
use statsync_ingest::source::SourceClient;
use statsync_ingest::stage::{LocalObjectStore, ObjectStore, Stager};
use statsync_ingest::{FailureKind, IngestError, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

#[derive(Default)]
struct RecordingWarehouse {
    jobs: Mutex<Vec<LoadJob>>,
    fail_tables: Vec<String>,
}

impl RecordingWarehouse {
    fn failing_on(table: &str) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail_tables: vec![table.to_string()],
        }
    }

    fn jobs(&self) -> Vec<LoadJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn run_load_job(&self, job: &LoadJob) -> Result<u64> {
        self.jobs.lock().unwrap().push(job.clone());
        if self.fail_tables.contains(&job.table_id) {
            return Err(IngestError::Load {
                table: job.destination(),
                message: "schema mismatch".to_string(),
            });
        }

        // Count NDJSON lines straight off the staged file
        let path = job.source_uri.trim_start_matches("file://");
        let content = std::fs::read_to_string(path).unwrap();
        Ok(content.lines().count() as u64)
    }
}

struct FailingStore;

#[async_trait]
impl ObjectStore for FailingStore {
    fn bucket(&self) -> &str {
        "unreachable"
    }

    async fn put_object(&self, key: &str, _body: Vec<u8>, _content_type: &str) -> Result<String> {
        Err(IngestError::Store {
            key: key.to_string(),
            message: "access denied".to_string(),
        })
    }
}

struct BrokenProvisioner;

#[async_trait]
impl Provisioner for BrokenProvisioner {
    async fn ensure_dataset(&self, dataset_id: &str, _location: &str) -> Result<DatasetStatus> {
        Err(IngestError::Provision {
            dataset: dataset_id.to_string(),
            message: "permission denied".to_string(),
        })
    }
}

fn config_for(server: &MockServer, root: &Path, endpoints: Vec<EndpointConfig>) -> IngestConfig {
    IngestConfig {
        source: SourceConfig {
            base_url: server.uri(),
            source_name: "nba_api".to_string(),
            user_agent: "statsync-test".to_string(),
        },
        storage: StorageConfig::Local {
            root: root.to_path_buf(),
        },
        warehouse: WarehouseConfig {
            project_id: "test-project".to_string(),
            dataset_id: "nba_raw_data".to_string(),
            location: "US".to_string(),
            api_base_url: "http://127.0.0.1:9".to_string(),
            access_token: None,
            poll_interval_ms: 1,
        },
        endpoints,
    }
}

fn driver_with(
    config: IngestConfig,
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<RecordingWarehouse>,
) -> RunDriver {
    let source = SourceClient::new(&config.source).unwrap();
    let loader = Loader::new(warehouse, config.warehouse.dataset_id.clone());
    RunDriver::new(Arc::new(config), source, Stager::new(store), loader)
}

async fn mount_page(server: &MockServer, endpoint: &str, page: u64, body: Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn staged_lines(locator: &str) -> Vec<Value> {
    let content = std::fs::read_to_string(locator.trim_start_matches("file://")).unwrap();
    content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_two_page_endpoint_is_staged_and_loaded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(
        &server,
        "/api/games",
        1,
        json!({"data": [{"ID": 1}], "pagination": {"page": 1, "pages": 2}}),
    )
    .await;
    mount_page(
        &server,
        "/api/games",
        2,
        json!({"data": [{"ID": 2}], "pagination": {"page": 2, "pages": 2}}),
    )
    .await;

    let config = config_for(
        &server,
        dir.path(),
        vec![EndpointConfig::new("games", "/api/games", "api_games_raw")],
    );
    let warehouse = Arc::new(RecordingWarehouse::default());
    let store = Arc::new(LocalObjectStore::new(dir.path()));
    let summary = driver_with(config, store, warehouse.clone()).run().await;

    let locator = match summary.get("games") {
        Some(EndpointOutcome::Loaded { rows, locator }) => {
            assert_eq!(*rows, 2);
            locator.clone()
        },
        other => panic!("unexpected outcome: {:?}", other),
    };

    assert_eq!(staged_lines(&locator), vec![json!({"ID": 1}), json!({"ID": 2})]);

    let file_name = Path::new(&locator).file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("nba_api_games_data_"));
    assert!(file_name.ends_with(".json"));
    // <YYYYMMDD_HHMMSS>
    let stamp = file_name
        .trim_start_matches("nba_api_games_data_")
        .trim_end_matches(".json");
    assert_eq!(stamp.len(), 15);
    assert_eq!(&stamp[8..9], "_");

    let jobs = warehouse.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].source_uri, locator);
    assert_eq!(jobs[0].destination(), "nba_raw_data.api_games_raw");
}

#[tokio::test]
async fn test_failing_endpoint_does_not_stop_the_next() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/games"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_page(&server, "/api/playertotals", 1, json!({"data": [{"player": "x"}]})).await;

    let config = config_for(
        &server,
        dir.path(),
        vec![
            EndpointConfig::new("games", "/api/games", "api_games_raw"),
            EndpointConfig::new("playertotals", "/api/playertotals", "api_playertotals_raw"),
        ],
    );
    let warehouse = Arc::new(RecordingWarehouse::default());
    let store = Arc::new(LocalObjectStore::new(dir.path()));
    let summary = driver_with(config, store, warehouse.clone()).run().await;

    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.reports[0].name, "games");
    assert!(matches!(
        summary.get("games"),
        Some(EndpointOutcome::Failed {
            step: Step::Fetch,
            kind: FailureKind::Transport,
            ..
        })
    ));
    assert!(matches!(
        summary.get("playertotals"),
        Some(EndpointOutcome::Loaded { rows: 1, .. })
    ));
    assert_eq!(summary.loaded(), 1);
    assert_eq!(summary.failed(), 1);

    let jobs = warehouse.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].table_id, "api_playertotals_raw");
}

#[tokio::test]
async fn test_empty_endpoint_skips_stage_and_load() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/api/games", 1, json!({"data": []})).await;

    let config = config_for(
        &server,
        dir.path(),
        vec![EndpointConfig::new("games", "/api/games", "api_games_raw")],
    );
    let warehouse = Arc::new(RecordingWarehouse::default());
    let store = Arc::new(LocalObjectStore::new(dir.path()));
    let summary = driver_with(config, store, warehouse.clone()).run().await;

    assert_eq!(summary.get("games"), Some(&EndpointOutcome::Empty));
    assert!(warehouse.jobs().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_stage_failure_skips_load() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/api/games", 1, json!([{"id": 1}])).await;

    let config = config_for(
        &server,
        dir.path(),
        vec![EndpointConfig::new("games", "/api/games", "api_games_raw")],
    );
    let warehouse = Arc::new(RecordingWarehouse::default());
    let summary = driver_with(config, Arc::new(FailingStore), warehouse.clone())
        .run()
        .await;

    assert!(matches!(
        summary.get("games"),
        Some(EndpointOutcome::Failed {
            step: Step::Stage,
            kind: FailureKind::Store,
            ..
        })
    ));
    assert!(warehouse.jobs().is_empty());
}

#[tokio::test]
async fn test_load_failure_is_reported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/api/games", 1, json!({"data": [{"id": 1}]})).await;

    let config = config_for(
        &server,
        dir.path(),
        vec![EndpointConfig::new("games", "/api/games", "api_games_raw")],
    );
    let warehouse = Arc::new(RecordingWarehouse::failing_on("api_games_raw"));
    let store = Arc::new(LocalObjectStore::new(dir.path()));
    let summary = driver_with(config, store, warehouse).run().await;

    match summary.get("games") {
        Some(EndpointOutcome::Failed {
            step,
            kind,
            message,
        }) => {
            assert_eq!(*step, Step::Load);
            assert_eq!(*kind, FailureKind::Load);
            assert!(message.contains("schema mismatch"));
        },
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_normalized_endpoint_has_lowercase_keys() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/api/games", 1, json!({"data": [{"GameID": 7}]})).await;
    mount_page(
        &server,
        "/api/playershotchart",
        1,
        json!({"data": [{"PlayerName": "A", "Shot": {"Made": true}}]}),
    )
    .await;

    let config = config_for(
        &server,
        dir.path(),
        vec![
            EndpointConfig::new("games", "/api/games", "api_games_raw"),
            EndpointConfig::new(
                "playershotchart",
                "/api/playershotchart",
                "api_playershotchart_raw",
            )
            .with_normalized_keys(),
        ],
    );
    let warehouse = Arc::new(RecordingWarehouse::default());
    let store = Arc::new(LocalObjectStore::new(dir.path()));
    let summary = driver_with(config, store, warehouse).run().await;

    let locator_of = |name: &str| match summary.get(name) {
        Some(EndpointOutcome::Loaded { locator, .. }) => locator.clone(),
        other => panic!("unexpected outcome for {}: {:?}", name, other),
    };

    assert_eq!(staged_lines(&locator_of("games")), vec![json!({"GameID": 7})]);
    assert_eq!(
        staged_lines(&locator_of("playershotchart")),
        vec![json!({"playername": "A", "shot": {"made": true}})]
    );
}

#[tokio::test]
async fn test_provisioner_failure_does_not_abort_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/api/games", 1, json!({"data": [{"id": 1}, {"id": 2}]})).await;

    let config = config_for(
        &server,
        dir.path(),
        vec![EndpointConfig::new("games", "/api/games", "api_games_raw")],
    );
    let warehouse = Arc::new(RecordingWarehouse::default());
    let store = Arc::new(LocalObjectStore::new(dir.path()));
    let summary = driver_with(config, store, warehouse)
        .with_provisioner(Arc::new(BrokenProvisioner))
        .run()
        .await;

    assert!(matches!(
        summary.get("games"),
        Some(EndpointOutcome::Loaded { rows: 2, .. })
    ));
}
