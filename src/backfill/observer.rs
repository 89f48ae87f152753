//! Progress reporting hooks

use super::RuleSummary;
use crate::block::BlockWriteOutcome;
use crate::rules::{Rule, RuleGroup};
use std::time::Duration;
use tracing::info;

/// Receives progress events of a run. Every method defaults to a no-op.
pub trait RunObserver: Send + Sync {
    fn rule_started(&self, _group: &RuleGroup, _rule: &Rule, _step: Duration) {}

    /// A block with at least one sample was written.
    fn block_written(&self, _rule: &Rule, _outcome: &BlockWriteOutcome) {}

    fn rule_finished(&self, _summary: &RuleSummary) {}
}

/// Observer logging through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn rule_started(&self, group: &RuleGroup, rule: &Rule, step: Duration) {
        info!(
            group = %group.name,
            rule = %rule.name,
            step = %humantime::format_duration(step),
            "Processing rule"
        );
    }

    fn block_written(&self, rule: &Rule, outcome: &BlockWriteOutcome) {
        info!(
            rule = %rule.name,
            start = outcome.interval.start,
            end = outcome.interval.end,
            samples = outcome.samples,
            block_id = outcome.block.as_ref().map(|b| b.id.as_str()).unwrap_or(""),
            "Wrote block"
        );
    }

    fn rule_finished(&self, summary: &RuleSummary) {
        info!(
            rule = %summary.rule,
            series = summary.series,
            samples = summary.samples,
            blocks = summary.blocks,
            "Rule done"
        );
    }
}
