//! Run configuration: time window, step and block duration, plus the
//! component factory that builds the query client and block store.

use crate::block::{BlockStore, ParquetBlockStore};
use crate::clock::Clock;
use crate::query::{LokiClient, LokiClientConfig, QueryClient};
use crate::{Error, Result};

use chrono::{DateTime, Utc};
use object_store::{local::LocalFileSystem, memory::InMemory, ObjectStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default query step when neither rule nor group sets one
pub const DEFAULT_STEP: &str = "60s";
/// Default block duration (Prometheus' head block size)
pub const DEFAULT_BLOCK_DURATION: &str = "2h";
/// How far behind now the window ends when no end time is given
pub const DEFAULT_END_LAG: Duration = Duration::from_secs(3 * 60 * 60);

/// Parse a time given as RFC 3339 or as integer Unix seconds.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(secs) = raw.parse::<i64>() {
        if let Some(t) = DateTime::from_timestamp(secs, 0) {
            return Ok(t);
        }
    }
    Err(Error::Config(format!("invalid time: {:?}", raw)))
}

/// Parse a positive duration flag such as `60s`, `2h` or `1d`.
pub fn parse_duration(flag: &str, raw: &str) -> Result<Duration> {
    let duration = humantime::parse_duration(raw.trim())
        .map_err(|e| Error::Config(format!("invalid {} {:?}: {}", flag, raw, e)))?;
    if duration.is_zero() {
        return Err(Error::Config(format!("{} must be greater than zero", flag)));
    }
    Ok(duration)
}

/// The global query window. `start` is always strictly before `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(Error::Config(
                "start time must be before end time".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Build the window from CLI flags. A missing end defaults to three hours
    /// before now, keeping clear of data Loki may still be ingesting.
    pub fn from_flags(start: &str, end: Option<&str>, clock: &dyn Clock) -> Result<Self> {
        let start = parse_time(start)
            .map_err(|_| Error::Config(format!("invalid start time: {:?}", start)))?;
        let end = match end.map(str::trim).filter(|e| !e.is_empty()) {
            Some(end) => {
                parse_time(end).map_err(|_| Error::Config(format!("invalid end time: {:?}", end)))?
            }
            None => clock.now() - chrono::Duration::seconds(DEFAULT_END_LAG.as_secs() as i64),
        };
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Window start in milliseconds, truncated to whole seconds.
    pub fn start_ms(&self) -> i64 {
        self.start.timestamp() * 1000
    }

    /// Window end in milliseconds, truncated to whole seconds.
    pub fn end_ms(&self) -> i64 {
        self.end.timestamp() * 1000
    }
}

/// Options shared by every rule of a run.
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    pub window: TimeWindow,
    /// Step used when neither the rule nor its group sets one
    pub default_step: Duration,
    /// Length of every block; drives both partitioning and the session's
    /// block range
    block_duration: Duration,
}

impl BackfillOptions {
    pub fn new(window: TimeWindow, default_step: Duration, block_duration: Duration) -> Result<Self> {
        if default_step.is_zero() {
            return Err(Error::Config("step must be greater than zero".to_string()));
        }
        if block_duration.as_millis() == 0 || block_duration.subsec_nanos() % 1_000_000 != 0 {
            return Err(Error::Config(format!(
                "block duration must be a positive whole number of milliseconds, got {:?}",
                block_duration
            )));
        }
        if i64::try_from(block_duration.as_millis()).is_err() {
            return Err(Error::Config("block duration is too large".to_string()));
        }
        Ok(Self {
            window,
            default_step,
            block_duration,
        })
    }

    pub fn block_duration(&self) -> Duration {
        self.block_duration
    }

    pub fn block_duration_ms(&self) -> i64 {
        self.block_duration.as_millis() as i64
    }

    /// Range handed to each write session: twice the block duration.
    pub fn block_range_ms(&self) -> i64 {
        self.block_duration_ms().saturating_mul(2)
    }
}

pub struct ComponentFactory;

impl ComponentFactory {
    /// Create the object store blocks are written to.
    ///
    /// A dry run keeps everything in memory so nothing touches the output
    /// directory.
    pub fn create_object_store(output_dir: &Path, dry_run: bool) -> Result<Arc<dyn ObjectStore>> {
        if dry_run {
            info!("Dry run: blocks are kept in memory and discarded");
            return Ok(Arc::new(InMemory::new()));
        }

        std::fs::create_dir_all(output_dir)?;
        info!(output_dir = %output_dir.display(), "Writing blocks to local filesystem");
        Ok(Arc::new(LocalFileSystem::new_with_prefix(output_dir)?))
    }

    pub fn create_block_store(output_dir: &Path, dry_run: bool) -> Result<Arc<dyn BlockStore>> {
        let object_store = Self::create_object_store(output_dir, dry_run)?;
        Ok(Arc::new(ParquetBlockStore::new(object_store)))
    }

    pub fn create_query_client(config: LokiClientConfig) -> Result<Arc<dyn QueryClient>> {
        Ok(Arc::new(LokiClient::new(config)?))
    }
}
