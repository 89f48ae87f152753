//! Block partitioning and the block write protocol.
//!
//! A run splits its window into fixed-duration intervals aligned on
//! multiples of the block duration, so overlapping runs always agree on
//! block boundaries. Each interval is written through a [`BlockSession`]:
//!
//! ```text
//! open_session → appender → append* → commit → flush → close
//! ```
//!
//! `close` is reachable from every state so a failed write still releases
//! the session.

mod encoding;
mod head;
mod parquet;
mod writer;

pub use encoding::{BlockEncoder, BLOCK_ID_KEY, BLOCK_MAX_TIME_KEY, BLOCK_MIN_TIME_KEY};
pub use head::Head;
pub use parquet::{ParquetBlockSession, ParquetBlockStore, BLOCK_DATA_FILE, BLOCK_META_FILE};
pub use writer::{write_block, BlockWriteOutcome};

use crate::labels::LabelSet;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Reference to a series inside one write session. `0` means unknown: the
/// series is looked up by its labels.
pub type SeriesRef = u64;

/// An inclusive `[start, end]` millisecond range covered by one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockInterval {
    pub start: i64,
    pub end: i64,
}

impl BlockInterval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Split `[mint, maxt]` into block intervals.
///
/// The first interval starts at the aligned boundary at or before `mint`;
/// every interval spans `block_duration_ms` except the last, whose end is
/// clamped to `maxt`. A `maxt` on a boundary gets a trailing `[maxt, maxt]`
/// interval, so every timestamp in `[mint, maxt]` has exactly one owner.
/// A non-positive duration produces no intervals.
pub fn partition(mint: i64, maxt: i64, block_duration_ms: i64) -> Vec<BlockInterval> {
    if block_duration_ms <= 0 {
        return Vec::new();
    }

    let mut intervals = Vec::new();
    let mut start = mint - mint.rem_euclid(block_duration_ms);
    while start <= maxt {
        let end = (start + block_duration_ms - 1).min(maxt);
        intervals.push(BlockInterval::new(start, end));
        start += block_duration_ms;
    }
    intervals
}

/// Statistics recorded in a block's meta file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStats {
    pub num_samples: u64,
    pub num_series: u64,
}

/// Description of a persisted block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMeta {
    /// Block identifier; also the block's directory name
    pub id: String,
    /// Smallest sample timestamp (inclusive)
    pub min_time: i64,
    /// Largest sample timestamp plus one (exclusive)
    pub max_time: i64,
    pub stats: BlockStats,
    pub version: u32,
}

/// Storage engine that persists blocks.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Open a write session for one block. `block_range_ms` bounds the time
    /// span a session accepts.
    async fn open_session(&self, block_range_ms: i64) -> Result<Box<dyn BlockSession>>;
}

/// A write session producing at most one block.
#[async_trait]
pub trait BlockSession: Send {
    /// Begin the session's append transaction.
    fn appender(&mut self) -> Result<Box<dyn Appender + Send + '_>>;

    /// Persist committed samples. Returns `None` when there was nothing to
    /// write.
    async fn flush(&mut self) -> Result<Option<BlockMeta>>;

    /// Release the session. Safe to call in any state, and more than once.
    async fn close(&mut self) -> Result<()>;
}

/// An append transaction; nothing is visible to `flush` before `commit`.
pub trait Appender {
    fn append(
        &mut self,
        series_ref: SeriesRef,
        labels: &LabelSet,
        timestamp_ms: i64,
        value: f64,
    ) -> Result<SeriesRef>;

    fn commit(self: Box<Self>) -> Result<()>;
}
