//! Parquet encoding of a block's data file
//!
//! Rows arrive grouped by series and time-ordered within a series, so the
//! file declares its sort order: `metric_name`, every label column in schema
//! order, then `timestamp`, all ascending with nulls last. The block's id and
//! time range are repeated in the file's key-value metadata so a data file
//! can be matched to its block without `meta.json`.

use super::BlockMeta;
use crate::schema::{METRIC_NAME_FIELD, TIMESTAMP_FIELD, VALUE_FIELD};
use crate::Result;
use arrow_array::RecordBatch;
use arrow_schema::Schema;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties, WriterVersion};
use parquet::format::{KeyValue, SortingColumn};

/// Key-value metadata key holding the block id
pub const BLOCK_ID_KEY: &str = "loki_backfill.block_id";
/// Key-value metadata key holding the block's inclusive min time
pub const BLOCK_MIN_TIME_KEY: &str = "loki_backfill.min_time";
/// Key-value metadata key holding the block's exclusive max time
pub const BLOCK_MAX_TIME_KEY: &str = "loki_backfill.max_time";

const ZSTD_LEVEL: i32 = 3;

/// Encodes one block's samples as a Parquet file.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockEncoder;

impl BlockEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode `batch`, whose rows must already be in block sort order.
    ///
    /// A block is written as a single row group.
    pub fn encode(&self, batch: &RecordBatch, meta: &BlockMeta) -> Result<Bytes> {
        let props = Self::properties(&batch.schema(), meta, batch.num_rows());

        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;

        Ok(Bytes::from(buffer))
    }

    fn properties(schema: &Schema, meta: &BlockMeta, rows: usize) -> WriterProperties {
        WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(Compression::ZSTD(
                ZstdLevel::try_new(ZSTD_LEVEL).unwrap_or_default(),
            ))
            // Label values repeat for every sample of a series
            .set_dictionary_enabled(true)
            .set_statistics_enabled(EnabledStatistics::Page)
            .set_max_row_group_size(rows.max(1))
            .set_sorting_columns(Some(sorting_columns(schema)))
            .set_key_value_metadata(Some(vec![
                KeyValue::new(BLOCK_ID_KEY.to_string(), meta.id.clone()),
                KeyValue::new(BLOCK_MIN_TIME_KEY.to_string(), meta.min_time.to_string()),
                KeyValue::new(BLOCK_MAX_TIME_KEY.to_string(), meta.max_time.to_string()),
            ]))
            .build()
    }
}

/// Sort order of a block file: series identity first, then time.
fn sorting_columns(schema: &Schema) -> Vec<SortingColumn> {
    let ascending = |idx: usize| SortingColumn {
        column_idx: idx as i32,
        descending: false,
        nulls_first: false,
    };

    let mut columns = Vec::with_capacity(schema.fields().len());
    if let Ok(idx) = schema.index_of(METRIC_NAME_FIELD) {
        columns.push(ascending(idx));
    }
    for (idx, field) in schema.fields().iter().enumerate() {
        match field.name().as_str() {
            TIMESTAMP_FIELD | METRIC_NAME_FIELD | VALUE_FIELD => {}
            _ => columns.push(ascending(idx)),
        }
    }
    if let Ok(idx) = schema.index_of(TIMESTAMP_FIELD) {
        columns.push(ascending(idx));
    }
    columns
}
