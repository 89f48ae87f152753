//! Rules file: named Loki queries grouped with a default step.
//!
//! ```yaml
//! groups:
//!   - name: nginx
//!     step: 30s
//!     rules:
//!       - name: nginx_requests_total
//!         query: sum by (status) (count_over_time({job="nginx"}[1m]))
//!         labels:
//!           source: loki
//!       - name: nginx_errors_5m
//!         query: sum(count_over_time({job="nginx"} |= "error" [5m]))
//!         step: 5m
//! ```

use crate::config::parse_duration;
use crate::labels::LabelSet;
use crate::{Error, Result};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// A named query whose results become one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Metric name written as `__name__`
    pub name: String,
    /// LogQL metric query
    pub query: String,
    /// Step override for this rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Static labels added to every series of this rule
    #[serde(default)]
    pub labels: LabelSet,
}

/// A group of rules sharing a default step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Decoded rules file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

impl RulesFile {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read, decode and validate a rules file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("open rules file {}: {}", path.display(), e))
        })?;
        let rules = Self::from_yaml(&raw)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check every rule can be processed: names and queries are present and
    /// every step override parses.
    pub fn validate(&self) -> Result<()> {
        for group in &self.groups {
            if let Some(step) = non_empty(group.step.as_deref()) {
                parse_step(step).map_err(|e| in_context(format!("group {}", group.name), e))?;
            }
            for rule in &group.rules {
                if rule.name.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "group {}: rule without a name",
                        group.name
                    )));
                }
                if rule.query.trim().is_empty() {
                    return Err(Error::Config(format!("rule {}: empty query", rule.name)));
                }
                if let Some(step) = non_empty(rule.step.as_deref()) {
                    parse_step(step).map_err(|e| in_context(format!("rule {}", rule.name), e))?;
                }
            }
        }
        Ok(())
    }

    /// All rules with their group, in declaration order.
    pub fn rules(&self) -> impl Iterator<Item = (&RuleGroup, &Rule)> {
        self.groups
            .iter()
            .flat_map(|group| group.rules.iter().map(move |rule| (group, rule)))
    }

    pub fn rule_count(&self) -> usize {
        self.groups.iter().map(|g| g.rules.len()).sum()
    }
}

impl RuleGroup {
    /// Step for a rule of this group: the rule's own, else the group's, else
    /// `default`.
    pub fn effective_step(&self, rule: &Rule, default: Duration) -> Result<Duration> {
        match first_non_empty([rule.step.as_deref(), self.step.as_deref()]) {
            Some(step) => parse_step(step),
            None => Ok(default),
        }
    }
}

/// First candidate that is present and not blank.
pub fn first_non_empty<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<&'a str> {
    candidates.into_iter().find_map(non_empty)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn in_context(context: String, err: Error) -> Error {
    match err {
        Error::Config(msg) => Error::Config(format!("{}: {}", context, msg)),
        other => other,
    }
}

/// Parse a query step such as `60s` or `1m 30s`.
pub fn parse_step(raw: &str) -> Result<Duration> {
    parse_duration("step", raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"
groups:
  - name: nginx
    step: 30s
    rules:
      - name: nginx_requests_total
        query: sum by (status) (count_over_time({job="nginx"}[1m]))
        labels:
          source: loki
      - name: nginx_errors_5m
        query: sum(count_over_time({job="nginx"} |= "error" [5m]))
        step: 5m
  - name: app
    rules:
      - name: app_lines
        query: sum(count_over_time({app="api"}[1m]))
"#;

    fn rule(name: &str, step: Option<&str>) -> Rule {
        Rule {
            name: name.to_string(),
            query: "sum(rate({job=\"x\"}[1m]))".to_string(),
            step: step.map(str::to_string),
            labels: LabelSet::new(),
        }
    }

    #[test]
    fn test_decode_rules_file() {
        let rules = RulesFile::from_yaml(RULES).unwrap();
        assert_eq!(rules.groups.len(), 2);
        assert_eq!(rules.rule_count(), 3);

        let nginx = &rules.groups[0];
        assert_eq!(nginx.step.as_deref(), Some("30s"));
        assert_eq!(nginx.rules[0].labels.get("source").map(String::as_str), Some("loki"));
        assert_eq!(nginx.rules[1].step.as_deref(), Some("5m"));
        assert!(rules.groups[1].step.is_none());
        assert!(rules.validate().is_ok());

        let names: Vec<&str> = rules.rules().map(|(_, r)| r.name.as_str()).collect();
        assert_eq!(names, vec!["nginx_requests_total", "nginx_errors_5m", "app_lines"]);
    }

    #[test]
    fn test_step_precedence() {
        let default = Duration::from_secs(60);
        let group = RuleGroup {
            name: "g".into(),
            step: Some("30s".into()),
            rules: vec![],
        };
        let bare_group = RuleGroup {
            name: "bare".into(),
            step: None,
            rules: vec![],
        };

        // rule > group > default
        assert_eq!(
            group.effective_step(&rule("own", Some("5m")), default).unwrap(),
            Duration::from_secs(300)
        );
        assert_eq!(
            group.effective_step(&rule("inherits", None), default).unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(
            bare_group.effective_step(&rule("fallback", None), default).unwrap(),
            default
        );
        assert_eq!(
            bare_group.effective_step(&rule("blank", Some("")), default).unwrap(),
            default
        );
    }

    #[test]
    fn test_first_non_empty() {
        assert_eq!(first_non_empty([None, Some(""), Some("b")]), Some("b"));
        assert_eq!(first_non_empty([Some("a"), Some("b")]), Some("a"));
        assert_eq!(first_non_empty([None, Some("  ")]), None);
    }

    #[test]
    fn test_validate_rejects_bad_step() {
        let rules = RulesFile {
            groups: vec![RuleGroup {
                name: "g".into(),
                step: None,
                rules: vec![rule("r1", Some("sixty seconds"))],
            }],
        };
        let err = rules.validate().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("rule r1"));
    }

    #[test]
    fn test_validate_rejects_unnamed_rule() {
        let rules = RulesFile {
            groups: vec![RuleGroup {
                name: "g".into(),
                step: None,
                rules: vec![rule("", None)],
            }],
        };
        assert!(rules.validate().unwrap_err().is_config());
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let err = RulesFile::from_yaml("groups: [name: {").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_load_missing_file() {
        let err = RulesFile::load("/nonexistent/rules.yaml").unwrap_err();
        assert!(err.to_string().contains("open rules file"));
    }
}
