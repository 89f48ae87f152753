//! Block store writing one Parquet data file plus a JSON meta file per block
//!
//! Layout under the store root:
//!
//! ```text
//! <block id>/chunks.parquet
//! <block id>/meta.json
//! ```
//!
//! `meta.json` is written last; a block directory without it is incomplete.

use super::head::MemSeries;
use super::{Appender, BlockEncoder, BlockMeta, BlockSession, BlockStats, BlockStore, Head, SeriesRef};
use crate::labels::{LabelSet, METRIC_NAME_LABEL};
use crate::schema::BlockSchema;
use crate::{Error, Result};

use arrow_array::builder::{StringBuilder, StringDictionaryBuilder};
use arrow_array::types::UInt16Type;
use arrow_array::{ArrayRef, Float64Array, RecordBatch, TimestampMillisecondArray};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of a block's data file
pub const BLOCK_DATA_FILE: &str = "chunks.parquet";
/// Name of a block's meta file
pub const BLOCK_META_FILE: &str = "meta.json";

const BLOCK_FORMAT_VERSION: u32 = 1;

/// Block store on top of an object store.
#[derive(Debug, Clone)]
pub struct ParquetBlockStore {
    object_store: Arc<dyn ObjectStore>,
    encoder: BlockEncoder,
}

impl ParquetBlockStore {
    pub fn new(object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            object_store,
            encoder: BlockEncoder::new(),
        }
    }

    /// Store rooted at a local directory, created if missing.
    pub fn local(dir: impl AsRef<std::path::Path>) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self::new(Arc::new(LocalFileSystem::new_with_prefix(dir)?)))
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.object_store
    }
}

#[async_trait]
impl BlockStore for ParquetBlockStore {
    async fn open_session(&self, block_range_ms: i64) -> Result<Box<dyn BlockSession>> {
        if block_range_ms <= 0 {
            return Err(Error::Storage(format!(
                "block range must be positive, got {}ms",
                block_range_ms
            )));
        }
        Ok(Box::new(ParquetBlockSession {
            object_store: self.object_store.clone(),
            encoder: self.encoder,
            head: Head::new(block_range_ms),
            state: SessionState::Opened,
            written: Vec::new(),
        }))
    }
}

/// Lifecycle of a session; each state is entered only from the one before,
/// except `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Opened,
    Appending,
    Committed,
    Flushed,
    Closed,
}

/// Write session of a [`ParquetBlockStore`].
#[derive(Debug)]
pub struct ParquetBlockSession {
    object_store: Arc<dyn ObjectStore>,
    encoder: BlockEncoder,
    head: Head,
    state: SessionState,
    /// Objects of a flush in progress, removed again if the session closes
    /// before the block is complete
    written: Vec<Path>,
}

impl ParquetBlockSession {
    fn expect_state(&self, expected: SessionState, op: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::Storage(format!(
                "cannot {} a session in state {:?}",
                op, self.state
            )));
        }
        Ok(())
    }

    fn build_batch(&self) -> Result<RecordBatch> {
        let schema = BlockSchema::builder()
            .with_labels(self.head.series().flat_map(|s| s.labels.keys().cloned()))
            .build();

        let rows = self.head.sample_count();
        let mut timestamps = Vec::with_capacity(rows);
        let mut values = Vec::with_capacity(rows);
        let mut names = StringDictionaryBuilder::<UInt16Type>::new();
        let mut label_builders: Vec<(&str, StringBuilder)> = schema
            .label_columns()
            .map(|(key, _)| (key, StringBuilder::new()))
            .collect();

        for series in sorted_series(&self.head, &schema) {
            let name = series.labels.get(METRIC_NAME_LABEL);
            for (ts, value) in &series.samples {
                timestamps.push(*ts);
                values.push(*value);
                match name {
                    Some(name) => {
                        names.append(name.as_str())?;
                    }
                    None => names.append_null(),
                }
                for (key, builder) in label_builders.iter_mut() {
                    builder.append_option(series.labels.get(*key));
                }
            }
        }

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(label_builders.len() + 3);
        columns.push(Arc::new(
            TimestampMillisecondArray::from(timestamps).with_timezone("UTC"),
        ));
        columns.push(Arc::new(names.finish()));
        for (_, mut builder) in label_builders {
            columns.push(Arc::new(builder.finish()));
        }
        columns.push(Arc::new(Float64Array::from(values)));

        Ok(RecordBatch::try_new(schema.arrow_schema(), columns)?)
    }

    async fn put(&mut self, path: Path, payload: Bytes) -> Result<()> {
        self.object_store.put(&path, payload.into()).await?;
        self.written.push(path);
        Ok(())
    }

    async fn discard_written(&mut self) -> Result<()> {
        let mut first_err = None;
        for path in std::mem::take(&mut self.written) {
            match self.object_store.delete(&path).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to remove partial block file");
                    first_err.get_or_insert(Error::from(e));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl BlockSession for ParquetBlockSession {
    fn appender(&mut self) -> Result<Box<dyn Appender + Send + '_>> {
        self.expect_state(SessionState::Opened, "append to")?;
        self.state = SessionState::Appending;
        Ok(Box::new(ParquetAppender {
            head: &mut self.head,
            state: &mut self.state,
            pending: Vec::new(),
        }))
    }

    async fn flush(&mut self) -> Result<Option<BlockMeta>> {
        self.expect_state(SessionState::Committed, "flush")?;

        let (min_time, max_time) = match (self.head.min_time(), self.head.max_time()) {
            (Some(min), Some(max)) => (min, max),
            _ => {
                debug!("Empty head, no block written");
                self.state = SessionState::Flushed;
                return Ok(None);
            }
        };

        let meta = BlockMeta {
            id: uuid::Uuid::now_v7().to_string(),
            min_time,
            max_time: max_time + 1,
            stats: BlockStats {
                num_samples: self.head.sample_count() as u64,
                num_series: self.head.series_count() as u64,
            },
            version: BLOCK_FORMAT_VERSION,
        };

        let batch = self.build_batch()?;
        let parquet_bytes = self.encoder.encode(&batch, &meta)?;

        let data_path = Path::from(format!("{}/{}", meta.id, BLOCK_DATA_FILE));
        debug!(path = %data_path, size_bytes = parquet_bytes.len(), "Writing Parquet file");
        self.put(data_path, parquet_bytes).await?;

        let meta_bytes = Bytes::from(serde_json::to_vec_pretty(&meta)?);
        self.put(Path::from(format!("{}/{}", meta.id, BLOCK_META_FILE)), meta_bytes)
            .await?;

        self.written.clear();
        self.head.clear();
        self.state = SessionState::Flushed;
        Ok(Some(meta))
    }

    async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let complete = self.state == SessionState::Flushed;
        self.state = SessionState::Closed;
        self.head.clear();
        if complete {
            return Ok(());
        }
        self.discard_written().await
    }
}

/// Series of `head` in block sort order: by metric name, then by each label
/// column in schema order, a missing label sorting after any value.
fn sorted_series<'a>(head: &'a Head, schema: &BlockSchema) -> Vec<&'a MemSeries> {
    let sort_key = |series: &'a MemSeries| -> Vec<(bool, Option<&'a str>)> {
        std::iter::once(METRIC_NAME_LABEL)
            .chain(schema.label_columns().map(|(key, _)| key))
            .map(|key| {
                let value = series.labels.get(key).map(String::as_str);
                (value.is_none(), value)
            })
            .collect()
    };

    let mut keyed: Vec<_> = head.series().map(|s| (sort_key(s), s)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, series)| series).collect()
}

struct PendingSample {
    series_ref: SeriesRef,
    timestamp: i64,
    value: f64,
}

/// Append transaction of a [`ParquetBlockSession`]. Samples are staged and
/// only reach the head on commit; dropping the appender discards them.
struct ParquetAppender<'a> {
    head: &'a mut Head,
    state: &'a mut SessionState,
    pending: Vec<PendingSample>,
}

impl Appender for ParquetAppender<'_> {
    fn append(
        &mut self,
        series_ref: SeriesRef,
        labels: &LabelSet,
        timestamp_ms: i64,
        value: f64,
    ) -> Result<SeriesRef> {
        let series_ref = self.head.resolve_ref(series_ref, labels);
        self.head.check(series_ref, timestamp_ms, value)?;
        self.pending.push(PendingSample {
            series_ref,
            timestamp: timestamp_ms,
            value,
        });
        Ok(series_ref)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let ParquetAppender {
            head,
            state,
            pending,
        } = *self;

        for sample in pending {
            if let Err(e) = head.insert(sample.series_ref, sample.timestamp, sample.value) {
                // A half-applied transaction must never be flushed
                head.clear();
                return Err(e);
            }
        }
        *state = SessionState::Committed;
        Ok(())
    }
}
