//! Writing one interval of a query result as a block

use super::{Appender, BlockInterval, BlockMeta, BlockSession, BlockStore, SeriesRef};
use crate::error::WriteStage;
use crate::labels::LabelSet;
use crate::matrix::Matrix;
use crate::{Error, Result};
use tracing::{debug, warn};

/// Result of writing one block interval.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockWriteOutcome {
    pub interval: BlockInterval,
    /// Samples appended for this interval
    pub samples: u64,
    /// Meta of the persisted block; `None` when nothing was written
    pub block: Option<BlockMeta>,
}

/// Write the samples of `matrix` that fall inside `interval` through one
/// block session.
///
/// `resolve` maps a series' labels to the labels written to the block; it is
/// called once per series. The session is closed on every path, and the
/// first error encountered is the one returned.
pub async fn write_block<F>(
    store: &dyn BlockStore,
    interval: BlockInterval,
    block_range_ms: i64,
    matrix: &Matrix,
    resolve: F,
) -> Result<BlockWriteOutcome>
where
    F: Fn(&LabelSet) -> LabelSet,
{
    let mut session = store
        .open_session(block_range_ms)
        .await
        .map_err(|e| Error::block_write(WriteStage::Open, interval, e))?;

    let written = fill_and_flush(session.as_mut(), interval, matrix, &resolve).await;
    let closed = session.close().await;

    match (written, closed) {
        (Ok((samples, block)), Ok(())) => Ok(BlockWriteOutcome {
            interval,
            samples,
            block,
        }),
        (Ok(_), Err(e)) => Err(Error::block_write(WriteStage::Close, interval, e)),
        (Err((stage, e)), closed) => {
            if let Err(close_err) = closed {
                warn!(
                    start = interval.start,
                    end = interval.end,
                    error = %close_err,
                    "Failed to close block session after error"
                );
            }
            Err(Error::block_write(stage, interval, e))
        }
    }
}

async fn fill_and_flush<F>(
    session: &mut dyn BlockSession,
    interval: BlockInterval,
    matrix: &Matrix,
    resolve: &F,
) -> std::result::Result<(u64, Option<BlockMeta>), (WriteStage, Error)>
where
    F: Fn(&LabelSet) -> LabelSet,
{
    let samples = {
        let mut appender = session
            .appender()
            .map_err(|e| (WriteStage::Append, e))?;
        let samples = append_interval(appender.as_mut(), interval, matrix, resolve)
            .map_err(|e| (WriteStage::Append, e))?;
        appender.commit().map_err(|e| (WriteStage::Commit, e))?;
        samples
    };

    let block = session.flush().await.map_err(|e| (WriteStage::Flush, e))?;
    if let Some(meta) = &block {
        debug!(
            block_id = %meta.id,
            samples = meta.stats.num_samples,
            series = meta.stats.num_series,
            "Flushed block"
        );
    }
    Ok((samples, block))
}

fn append_interval<F>(
    appender: &mut (dyn Appender + Send + '_),
    interval: BlockInterval,
    matrix: &Matrix,
    resolve: &F,
) -> Result<u64>
where
    F: Fn(&LabelSet) -> LabelSet,
{
    let mut appended = 0u64;
    for series in matrix {
        let labels = resolve(&series.labels);
        let mut series_ref: SeriesRef = 0;
        for sample in series.samples.iter().filter(|s| interval.contains(s.timestamp)) {
            series_ref = appender.append(series_ref, &labels, sample.timestamp, sample.value)?;
            appended += 1;
        }
    }
    Ok(appended)
}
