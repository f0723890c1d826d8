//! Remote declarative-object store and watch stream interfaces.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::Value;

use crate::Result;
use crate::domain::RuleSource;

/// Object kinds this system reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ResourceKind {
    PrometheusRule,
    ConfigMap,
}

impl ResourceKind {
    /// Namespaced collection path relative to the API server root.
    pub fn collection_path(&self, namespace: &str) -> String {
        match self {
            Self::PrometheusRule => format!(
                "/apis/monitoring.coreos.com/v1/namespaces/{}/prometheusrules",
                namespace
            ),
            Self::ConfigMap => format!("/api/v1/namespaces/{}/configmaps", namespace),
        }
    }
}

/// A watched stream of rule objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchedResource {
    /// PrometheusRule custom objects carrying `spec.groups`.
    PrometheusRules,
    /// ConfigMaps matching a label selector, one rule file per `data` entry.
    RuleConfigMaps { selector: String },
}

impl WatchedResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::PrometheusRules => ResourceKind::PrometheusRule,
            Self::RuleConfigMaps { .. } => ResourceKind::ConfigMap,
        }
    }

    pub fn label_selector(&self) -> Option<&str> {
        match self {
            Self::PrometheusRules => None,
            Self::RuleConfigMaps { selector } => Some(selector),
        }
    }

    /// Rule dialect of imported groups.
    pub fn source(&self) -> RuleSource {
        match self {
            Self::PrometheusRules => RuleSource::Prometheus,
            Self::RuleConfigMaps { .. } => RuleSource::Loki,
        }
    }
}

impl std::fmt::Display for WatchedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrometheusRules => write!(f, "prometheusrules"),
            Self::RuleConfigMaps { selector } => write!(f, "configmaps[{}]", selector),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

/// One event of a watch stream.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub object: Value,
}

/// `metadata` fields read from a watched object.
///
/// Each field is read on its own: a malformed sibling (say a non-string
/// label value) never hides the name or the other labels.
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: Option<String>,
    /// String-valued labels only.
    pub labels: Option<std::collections::BTreeMap<String, String>>,
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    pub fn of(object: &Value) -> Self {
        let text = |pointer: &str| {
            object
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let labels = object
            .pointer("/metadata/labels")
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            });

        Self {
            name: text("/metadata/name").unwrap_or_default(),
            namespace: text("/metadata/namespace"),
            labels,
            resource_version: text("/metadata/resourceVersion"),
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.as_ref()?.get(name).map(String::as_str)
    }
}

/// Namespaced get/create/replace/delete.
///
/// `get`, `replace` and `delete` fail with [`crate::Error::RemoteNotFound`]
/// when the object does not exist.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<Value>;
    async fn create(&self, kind: ResourceKind, namespace: &str, body: &Value) -> Result<Value>;
    async fn replace(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        body: &Value,
    ) -> Result<Value>;
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()>;
}

/// Source of long-lived watch streams.
#[async_trait]
pub trait WatchSource: Send + Sync {
    /// Open a watch. The stream ends when the server closes it.
    async fn watch(
        &self,
        resource: &WatchedResource,
        namespace: &str,
    ) -> Result<BoxStream<'static, Result<WatchEvent>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_watch_event() {
        let event: WatchEvent = serde_json::from_value(json!({
            "type": "ADDED",
            "object": {"metadata": {"name": "rules", "labels": {"a": "b"}, "resourceVersion": "7"}}
        }))
        .unwrap();
        assert_eq!(event.event_type, WatchEventType::Added);

        let meta = ObjectMeta::of(&event.object);
        assert_eq!(meta.name, "rules");
        assert_eq!(meta.label("a"), Some("b"));
        assert_eq!(meta.resource_version.as_deref(), Some("7"));
    }

    #[test]
    fn test_malformed_labels_keep_name() {
        let meta = ObjectMeta::of(&json!({
            "metadata": {
                "name": "odd",
                "labels": {"tier": 3, "app.kubernetes.io/managed-by": ["promkeeper"], "team": "web"}
            }
        }));
        assert_eq!(meta.name, "odd");
        assert_eq!(meta.label("team"), Some("web"));
        assert_eq!(meta.label("tier"), None);
        assert_eq!(meta.label("app.kubernetes.io/managed-by"), None);
    }

    #[test]
    fn test_missing_metadata_defaults() {
        let meta = ObjectMeta::of(&json!({}));
        assert!(meta.name.is_empty());
        assert_eq!(meta.label("x"), None);
    }

    #[test]
    fn test_watched_resource_mapping() {
        let maps = WatchedResource::RuleConfigMaps {
            selector: "loki_rule=1".to_string(),
        };
        assert_eq!(maps.kind(), ResourceKind::ConfigMap);
        assert_eq!(maps.source(), RuleSource::Loki);
        assert_eq!(maps.label_selector(), Some("loki_rule=1"));
        assert_eq!(
            ResourceKind::ConfigMap.collection_path("mon"),
            "/api/v1/namespaces/mon/configmaps"
        );
    }
}
