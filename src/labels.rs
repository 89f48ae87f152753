//! Label sets and the precedence rules used to build a block series' labels.

use std::collections::BTreeMap;

/// Reserved label carrying the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A set of labels with unique keys, ordered by key.
pub type LabelSet = BTreeMap<String, String>;

/// Compute the labels a series is stored under.
///
/// Precedence, lowest to highest: the series' own labels, the rule's static
/// labels, then `__name__` set to the rule name.
pub fn resolve_labels(series: &LabelSet, rule_labels: &LabelSet, rule_name: &str) -> LabelSet {
    let mut resolved = series.clone();
    for (key, value) in rule_labels {
        resolved.insert(key.clone(), value.clone());
    }
    resolved.insert(METRIC_NAME_LABEL.to_string(), rule_name.to_string());
    resolved
}

/// Render a label set the way Prometheus prints series, e.g.
/// `{__name__="up", job="x"}`.
pub fn format_labels(labels: &LabelSet) -> String {
    let body = labels
        .iter()
        .map(|(k, v)| format!("{}={:?}", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", body)
}
