//! # loki-backfill
//!
//! Backfills metrics derived from logs into on-disk time-series blocks.
//!
//! A rules file names LogQL metric queries. Each query is run against a
//! Loki-compatible `query_range` API over one time window, and the resulting
//! matrix is written as fixed-duration blocks aligned on multiples of the
//! block duration, so repeated or overlapping runs agree on block boundaries.
//!
//! ## Architecture
//!
//! - **Rules**: YAML groups of named queries with optional step overrides
//! - **Query client**: `query_range` over HTTP, decoded into a [`matrix::Matrix`]
//! - **Backfiller**: per-rule orchestration of query, partitioning and writes
//! - **Block store**: one Parquet data file plus a JSON meta file per block,
//!   written through `object_store`

pub mod backfill;
pub mod block;
pub mod clock;
pub mod config;
pub mod labels;
pub mod matrix;
pub mod query;
pub mod rules;
pub mod schema;
pub mod telemetry;

mod error;

pub use error::{Error, Result, RulePhase, WriteStage};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::backfill::{Backfiller, LogObserver, RunObserver, RunSummary};
    pub use crate::block::{BlockInterval, BlockStore, ParquetBlockStore};
    pub use crate::config::{BackfillOptions, ComponentFactory, TimeWindow};
    pub use crate::query::{LokiClient, LokiClientConfig, QueryClient, RangeQuery};
    pub use crate::rules::RulesFile;
    pub use crate::{Error, Result};
}
