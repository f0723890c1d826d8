//! Rule file structures shared by the renderer and the reconciler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Rule dialect a stored rule belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    #[default]
    Prometheus,
    Loki,
}

/// A rule file: `{groups: [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

/// A named collection of rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

/// One alerting or recording rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<String>,
    pub expr: String,
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl RuleFile {
    pub fn single(group: RuleGroup) -> Self {
        Self {
            groups: vec![group],
        }
    }

    pub fn from_yaml(raw: &str) -> crate::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_file() {
        let file = RuleFile::from_yaml(
            r#"
groups:
  - name: shop
    rules:
      - alert: HighLatency
        expr: latency_seconds > 1
        for: 5m
        labels:
          severity: page
      - record: job:up:sum
        expr: sum(up) by (job)
"#,
        )
        .unwrap();

        assert_eq!(file.groups.len(), 1);
        let group = &file.groups[0];
        assert_eq!(group.name, "shop");
        assert_eq!(group.rules[0].alert.as_deref(), Some("HighLatency"));
        assert_eq!(group.rules[0].duration.as_deref(), Some("5m"));
        assert_eq!(group.rules[0].labels["severity"], "page");
        assert!(group.rules[1].alert.is_none());
    }

    #[test]
    fn test_rule_source_strings() {
        assert_eq!(RuleSource::Loki.to_string(), "loki");
        assert_eq!("prometheus".parse::<RuleSource>().unwrap(), RuleSource::Prometheus);
    }
}
