//! Notification bindings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::owner::OwnerRef;

/// Label whitelist entry attached to a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderFilter {
    pub name: String,
    pub value: String,
}

/// A configured binding of an owning entity to a driver/target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: i64,
    pub owner: OwnerRef,
    pub driver: String,
    pub value: String,
    pub alias: String,
    pub enabled: bool,
    pub filters: Vec<SenderFilter>,
}

impl Sender {
    /// Whether this sender accepts the payload.
    ///
    /// A sender without filters accepts everything; otherwise at least one
    /// filter must equal the corresponding `commonLabels` value.
    pub fn matches(&self, payload: &Value) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let labels = payload.get("commonLabels");
        self.filters.iter().any(|f| {
            labels
                .and_then(|l| l.get(&f.name))
                .and_then(Value::as_str)
                .is_some_and(|v| v == f.value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sender(filters: &[(&str, &str)]) -> Sender {
        Sender {
            id: 1,
            owner: OwnerRef::project(1),
            driver: "webhook".to_string(),
            value: "http://hook".to_string(),
            alias: String::new(),
            enabled: true,
            filters: filters
                .iter()
                .map(|(n, v)| SenderFilter {
                    name: n.to_string(),
                    value: v.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_no_filters_accepts() {
        assert!(sender(&[]).matches(&json!({"commonLabels": {}})));
    }

    #[test]
    fn test_any_filter_match_accepts() {
        let s = sender(&[("severity", "critical"), ("severity", "page")]);
        assert!(s.matches(&json!({"commonLabels": {"severity": "page"}})));
        assert!(!s.matches(&json!({"commonLabels": {"severity": "info"}})));
        assert!(!s.matches(&json!({})));
    }
}
