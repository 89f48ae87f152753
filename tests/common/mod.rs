//! Shared fixtures for integration tests: an in-process query client, a
//! recording observer, a stub Loki HTTP server and block read-back helpers.

#![allow(dead_code)]

use loki_backfill::backfill::{RuleSummary, RunObserver};
use loki_backfill::block::{BlockMeta, BlockWriteOutcome, BLOCK_DATA_FILE, BLOCK_META_FILE};
use loki_backfill::labels::LabelSet;
use loki_backfill::matrix::{Matrix, Sample, TimeSeries};
use loki_backfill::query::{QueryClient, RangeQuery};
use loki_backfill::rules::{Rule, RuleGroup};
use loki_backfill::{Error, Result};

use arrow::array::{Array, Float64Array, StringArray, TimestampMillisecondArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn series(pairs: &[(&str, &str)], samples: &[(i64, f64)]) -> TimeSeries {
    TimeSeries::new(
        labels(pairs),
        samples.iter().map(|(ts, v)| Sample::new(*ts, *v)).collect(),
    )
}

// =========================================================================
// Query client stub
// =========================================================================

/// Answers queries from a fixed table and records every query it receives.
/// Unknown queries return an empty matrix.
#[derive(Default)]
pub struct StubQueryClient {
    responses: HashMap<String, std::result::Result<Matrix, String>>,
    pub queries: Mutex<Vec<RangeQuery>>,
}

impl StubQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matrix(mut self, query: &str, matrix: Matrix) -> Self {
        self.responses.insert(query.to_string(), Ok(matrix));
        self
    }

    pub fn with_failure(mut self, query: &str, message: &str) -> Self {
        self.responses
            .insert(query.to_string(), Err(message.to_string()));
        self
    }

    pub fn queried(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.query.clone())
            .collect()
    }

    pub fn steps(&self) -> Vec<Duration> {
        self.queries.lock().unwrap().iter().map(|q| q.step).collect()
    }
}

#[async_trait]
impl QueryClient for StubQueryClient {
    async fn query_range(&self, query: &RangeQuery) -> Result<Matrix> {
        self.queries.lock().unwrap().push(query.clone());
        match self.responses.get(&query.query) {
            Some(Ok(matrix)) => Ok(matrix.clone()),
            Some(Err(msg)) => Err(Error::Query(msg.clone())),
            None => Ok(Matrix::new()),
        }
    }
}

// =========================================================================
// Observer
// =========================================================================

#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl RunObserver for RecordingObserver {
    fn rule_started(&self, _group: &RuleGroup, rule: &Rule, _step: Duration) {
        self.events
            .lock()
            .unwrap()
            .push(format!("start {}", rule.name));
    }

    fn block_written(&self, rule: &Rule, outcome: &BlockWriteOutcome) {
        self.events.lock().unwrap().push(format!(
            "block {} [{}, {}] {}",
            rule.name, outcome.interval.start, outcome.interval.end, outcome.samples
        ));
    }

    fn rule_finished(&self, summary: &RuleSummary) {
        self.events
            .lock()
            .unwrap()
            .push(format!("finish {}", summary.rule));
    }
}

// =========================================================================
// Block read-back
// =========================================================================

/// Every complete block in the store, ordered by min time.
pub async fn list_blocks(store: &dyn ObjectStore) -> Vec<BlockMeta> {
    let objects: Vec<_> = store.list(None).try_collect().await.unwrap();
    let mut metas = Vec::new();
    for object in objects {
        if object.location.filename() != Some(BLOCK_META_FILE) {
            continue;
        }
        let raw = store.get(&object.location).await.unwrap().bytes().await.unwrap();
        metas.push(serde_json::from_slice::<BlockMeta>(&raw).unwrap());
    }
    metas.sort_by_key(|m| (m.min_time, m.id.clone()));
    metas
}

pub async fn object_count(store: &dyn ObjectStore) -> usize {
    let objects: Vec<_> = store.list(None).try_collect().await.unwrap();
    objects.len()
}

/// Decode a block's data file into a single batch.
pub async fn read_block(store: &dyn ObjectStore, block_id: &str) -> RecordBatch {
    let path = Path::from(format!("{}/{}", block_id, BLOCK_DATA_FILE));
    let raw = store.get(&path).await.unwrap().bytes().await.unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(raw)
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<_, _>>().unwrap();
    assert_eq!(batches.len(), 1, "small blocks decode as one batch");
    batches.into_iter().next().unwrap()
}

/// A string-like column (plain or dictionary encoded) as owned values.
pub fn string_column(batch: &RecordBatch, name: &str) -> Vec<Option<String>> {
    let column = batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("missing column {name}"));
    let casted = arrow::compute::cast(column, &DataType::Utf8).unwrap();
    let strings = casted.as_any().downcast_ref::<StringArray>().unwrap();
    (0..strings.len())
        .map(|i| (!strings.is_null(i)).then(|| strings.value(i).to_string()))
        .collect()
}

pub fn timestamp_column(batch: &RecordBatch) -> Vec<i64> {
    batch
        .column_by_name("timestamp")
        .unwrap()
        .as_any()
        .downcast_ref::<TimestampMillisecondArray>()
        .unwrap()
        .values()
        .to_vec()
}

pub fn value_column(batch: &RecordBatch) -> Vec<f64> {
    batch
        .column_by_name("value")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap()
        .values()
        .to_vec()
}

// =========================================================================
// Stub Loki server
// =========================================================================

/// A request as seen by the stub server.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub params: HashMap<String, String>,
    pub authorization: Option<String>,
}

struct StubState {
    status: StatusCode,
    body: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

/// HTTP server answering every `query_range` request with a canned reply.
pub struct LokiStub {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl LokiStub {
    pub async fn start(status: StatusCode, body: impl Into<String>) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = Arc::new(StubState {
            status,
            body: body.into(),
            requests: requests.clone(),
        });

        let app = Router::new()
            .route("/loki/api/v1/query_range", get(query_range))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn query_range(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.requests.lock().unwrap().push(CapturedRequest {
        params,
        authorization,
    });
    (state.status, state.body.clone())
}

/// A `query_range` success body with one series per `(labels, values)`.
pub fn matrix_body(series: &[(&str, &str)]) -> String {
    let result: Vec<String> = series
        .iter()
        .map(|(metric, values)| format!(r#"{{"metric":{},"values":{}}}"#, metric, values))
        .collect();
    format!(
        r#"{{"status":"success","data":{{"resultType":"matrix","result":[{}]}}}}"#,
        result.join(",")
    )
}
