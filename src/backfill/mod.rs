//! Rule processing
//!
//! For every rule, in declaration order:
//! - Resolve the step (rule, then group, then the run default)
//! - Run the range query over the whole window
//! - Partition the window into aligned blocks
//! - Write each block through its own write session
//!
//! The first failing query or block write aborts the run. Blocks already
//! written stay on disk.

mod observer;

pub use observer::{LogObserver, RunObserver};

use crate::block::{partition, write_block, BlockInterval, BlockStore, BlockWriteOutcome};
use crate::config::BackfillOptions;
use crate::error::RulePhase;
use crate::labels::resolve_labels;
use crate::matrix::{sample_count, Matrix};
use crate::query::{QueryClient, RangeQuery};
use crate::rules::{Rule, RuleGroup, RulesFile};
use crate::{Error, Result};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-rule totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSummary {
    pub group: String,
    pub rule: String,
    pub step: Duration,
    /// Series returned by the query
    pub series: usize,
    /// Samples written across all blocks
    pub samples: u64,
    /// Blocks persisted; intervals without samples are not counted
    pub blocks: usize,
}

/// Totals of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rules: Vec<RuleSummary>,
}

impl RunSummary {
    pub fn total_samples(&self) -> u64 {
        self.rules.iter().map(|r| r.samples).sum()
    }

    pub fn total_blocks(&self) -> usize {
        self.rules.iter().map(|r| r.blocks).sum()
    }
}

/// Drives queries and block writes for a rules file.
pub struct Backfiller {
    query_client: Arc<dyn QueryClient>,
    block_store: Arc<dyn BlockStore>,
    observer: Arc<dyn RunObserver>,
    options: BackfillOptions,
}

impl Backfiller {
    /// Create a backfiller reporting progress through [`LogObserver`].
    pub fn new(
        query_client: Arc<dyn QueryClient>,
        block_store: Arc<dyn BlockStore>,
        options: BackfillOptions,
    ) -> Self {
        Self {
            query_client,
            block_store,
            observer: Arc::new(LogObserver),
            options,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &BackfillOptions {
        &self.options
    }

    /// Intervals every rule is written in.
    pub fn intervals(&self) -> Vec<BlockInterval> {
        partition(
            self.options.window.start_ms(),
            self.options.window.end_ms(),
            self.options.block_duration_ms(),
        )
    }

    /// Process every rule of `rules`.
    pub async fn run(&self, rules: &RulesFile) -> Result<RunSummary> {
        rules.validate()?;

        let intervals = self.intervals();
        info!(
            rules = rules.rule_count(),
            blocks_per_rule = intervals.len(),
            start = %self.options.window.start(),
            end = %self.options.window.end(),
            "Starting backfill"
        );

        let mut summary = RunSummary::default();
        for (group, rule) in rules.rules() {
            let rule_summary = self.run_rule(group, rule, &intervals).await?;
            self.observer.rule_finished(&rule_summary);
            summary.rules.push(rule_summary);
        }

        info!(
            rules = summary.rules.len(),
            samples = summary.total_samples(),
            blocks = summary.total_blocks(),
            "Backfill complete"
        );
        Ok(summary)
    }

    async fn run_rule(
        &self,
        group: &RuleGroup,
        rule: &Rule,
        intervals: &[BlockInterval],
    ) -> Result<RuleSummary> {
        let step = group
            .effective_step(rule, self.options.default_step)
            .map_err(|e| Error::rule(&rule.name, RulePhase::Query, e))?;
        self.observer.rule_started(group, rule, step);

        let matrix = self
            .query_client
            .query_range(&RangeQuery::new(
                rule.query.clone(),
                self.options.window.start(),
                self.options.window.end(),
                step,
            ))
            .await
            .map_err(|e| Error::rule(&rule.name, RulePhase::Query, e))?;
        debug!(
            rule = %rule.name,
            series = matrix.len(),
            samples = sample_count(&matrix),
            "Query returned"
        );

        let mut summary = RuleSummary {
            group: group.name.clone(),
            rule: rule.name.clone(),
            step,
            series: matrix.len(),
            samples: 0,
            blocks: 0,
        };

        for interval in intervals {
            let outcome = self
                .write_interval(rule, *interval, &matrix)
                .await
                .map_err(|e| Error::rule(&rule.name, RulePhase::Write, e))?;

            summary.samples += outcome.samples;
            if outcome.samples > 0 {
                summary.blocks += 1;
                self.observer.block_written(rule, &outcome);
            } else {
                debug!(
                    rule = %rule.name,
                    start = interval.start,
                    end = interval.end,
                    "No samples in block"
                );
            }
        }
        Ok(summary)
    }

    async fn write_interval(
        &self,
        rule: &Rule,
        interval: BlockInterval,
        matrix: &Matrix,
    ) -> Result<BlockWriteOutcome> {
        write_block(
            self.block_store.as_ref(),
            interval,
            self.options.block_range_ms(),
            matrix,
            |series| resolve_labels(series, &rule.labels, &rule.name),
        )
        .await
    }
}
