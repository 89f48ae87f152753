//! Range queries against the log backend.

mod loki;
mod wire;

pub use loki::{LokiClient, LokiClientConfig, QUERY_RANGE_PATH};
pub use wire::{MatrixElement, QueryRangeData, QueryRangeResponse, WireScalar};

use crate::matrix::Matrix;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A metric range query over `[start, end]` evaluated every `step`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    pub query: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl RangeQuery {
    pub fn new(
        query: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> Self {
        Self {
            query: query.into(),
            start,
            end,
            step,
        }
    }
}

/// Backend answering metric range queries with a matrix.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn query_range(&self, query: &RangeQuery) -> Result<Matrix>;
}
