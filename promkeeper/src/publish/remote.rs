//! Rule groups published as PrometheusRule objects.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::MANAGED_BY_LABEL;
use crate::domain::RuleGroup;
use crate::reconcile::remote::{ObjectMeta, ObjectStore, ResourceKind};

/// Object name of a group: `{prefix}-rules-{group}`, lowercased, with
/// characters outside `[a-z0-9.-]` replaced by `-`.
pub fn rule_object_name(prefix: &str, group: &str) -> String {
    let group: String = group
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("{}-rules-{}", prefix, group)
}

pub struct RuleObjectPublisher {
    store: Arc<dyn ObjectStore>,
    namespace: String,
    prefix: String,
    marker: String,
}

impl RuleObjectPublisher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        namespace: impl Into<String>,
        prefix: impl Into<String>,
        marker: impl Into<String>,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            prefix: prefix.into(),
            marker: marker.into(),
        }
    }

    fn build_object(&self, name: &str, group: &RuleGroup) -> Result<Value> {
        Ok(json!({
            "apiVersion": "monitoring.coreos.com/v1",
            "kind": "PrometheusRule",
            "metadata": {
                "name": name,
                "namespace": self.namespace,
                "labels": { MANAGED_BY_LABEL: self.marker },
            },
            "spec": { "groups": [serde_json::to_value(group)?] },
        }))
    }

    /// Create or replace one object per group. Stops at the first remote
    /// error other than not-found.
    pub async fn publish_rule_objects(&self, groups: &[RuleGroup]) -> Result<usize> {
        let kind = ResourceKind::PrometheusRule;

        for group in groups {
            let name = rule_object_name(&self.prefix, &group.name);
            let mut body = self.build_object(&name, group)?;

            match self.store.get(kind, &self.namespace, &name).await {
                Ok(existing) => {
                    if let Some(version) = ObjectMeta::of(&existing).resource_version {
                        body["metadata"]["resourceVersion"] = Value::String(version);
                    }
                    self.store
                        .replace(kind, &self.namespace, &name, &body)
                        .await
                        .inspect_err(|e| warn!(%name, "Failed to replace rule object: {}", e))?;
                    debug!(%name, "Replaced rule object");
                }
                Err(e) if e.is_remote_not_found() => {
                    self.store
                        .create(kind, &self.namespace, &body)
                        .await
                        .inspect_err(|e| warn!(%name, "Failed to create rule object: {}", e))?;
                    debug!(%name, "Created rule object");
                }
                Err(e) => {
                    warn!(%name, "Failed to look up rule object: {}", e);
                    return Err(e);
                }
            }
        }

        info!(
            namespace = %self.namespace,
            count = groups.len(),
            "Published rule objects"
        );
        Ok(groups.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_object_name() {
        assert_eq!(rule_object_name("promkeeper", "Shop"), "promkeeper-rules-shop");
        assert_eq!(
            rule_object_name("pk", "web_front end"),
            "pk-rules-web-front-end"
        );
    }
}
