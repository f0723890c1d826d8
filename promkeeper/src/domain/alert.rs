//! Alert payload expansion.
//!
//! An inbound payload follows the Alertmanager webhook shape. Expansion maps
//! routing labels (`project`, `service`) to stored entities and decorates the
//! payload with links back to them. The result only depends on the payload
//! and the entity store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::owner::{OwnerKind, OwnerRef};
use crate::{Error, Result};

/// Labels that route an alert to an owning entity, in evaluation order.
pub const ROUTING_LABELS: [(&str, OwnerKind); 2] =
    [("project", OwnerKind::Project), ("service", OwnerKind::Service)];

/// A stored entity resolved from a routing label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEntity {
    pub owner: OwnerRef,
    pub name: String,
}

/// Lookup of routable entities by name.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn find_by_name(&self, kind: OwnerKind, name: &str) -> Result<Option<NamedEntity>>;
}

/// Result of expanding an alert payload.
#[derive(Debug, Clone)]
pub struct ExpandedAlert {
    /// Routing label -> owning entity.
    pub routable: BTreeMap<String, NamedEntity>,
    /// Payload with `commonLabels`/`commonAnnotations` guaranteed present.
    pub data: Value,
}

impl ExpandedAlert {
    pub fn common_labels(&self) -> BTreeMap<String, String> {
        common_labels(&self.data)
    }
}

/// Extract `commonLabels` as string pairs. Non-string values are rendered as JSON.
pub fn common_labels(data: &Value) -> BTreeMap<String, String> {
    data.get("commonLabels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn ensure_object<'a>(data: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let entry = data
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(map) => map,
        _ => unreachable!("entry was just replaced with an object"),
    }
}

/// Expand a raw alert body.
pub async fn expand_alert(
    alert_id: i64,
    body: &str,
    lookup: &dyn EntityLookup,
    external_url: &str,
) -> Result<ExpandedAlert> {
    let mut data: Value = serde_json::from_str(body)?;
    let Value::Object(root) = &mut data else {
        return Err(Error::validation(format!(
            "Alert {} payload is not a JSON object",
            alert_id
        )));
    };

    let base = external_url.trim_end_matches('/');
    ensure_object(root, "commonLabels");
    ensure_object(root, "commonAnnotations");
    root.insert(
        "externalURL".to_string(),
        Value::String(format!("{}/alert/{}", base, alert_id)),
    );

    let mut routable = BTreeMap::new();
    for (label, kind) in ROUTING_LABELS {
        let Some(name) = root
            .get("commonLabels")
            .and_then(|l| l.get(label))
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            continue;
        };

        let Some(entity) = lookup.find_by_name(kind, &name).await? else {
            continue;
        };

        ensure_object(root, "commonLabels")
            .insert(label.to_string(), Value::String(entity.name.clone()));
        ensure_object(root, "commonAnnotations").insert(
            label.to_string(),
            Value::String(format!("{}/{}/{}", base, kind, entity.owner.id)),
        );
        routable.insert(label.to_string(), entity);
    }

    Ok(ExpandedAlert { routable, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticLookup;

    #[async_trait]
    impl EntityLookup for StaticLookup {
        async fn find_by_name(&self, kind: OwnerKind, name: &str) -> Result<Option<NamedEntity>> {
            Ok(match (kind, name) {
                (OwnerKind::Project, "web") => Some(NamedEntity {
                    owner: OwnerRef::project(4),
                    name: "web".to_string(),
                }),
                (OwnerKind::Service, "shop") => Some(NamedEntity {
                    owner: OwnerRef::service(2),
                    name: "shop".to_string(),
                }),
                _ => None,
            })
        }
    }

    #[tokio::test]
    async fn test_expand_routes_known_entities() {
        let body = json!({
            "status": "firing",
            "commonLabels": {"project": "web", "service": "shop", "severity": "page"}
        })
        .to_string();

        let expanded = expand_alert(9, &body, &StaticLookup, "http://pk.example/")
            .await
            .unwrap();

        assert_eq!(expanded.routable.len(), 2);
        assert_eq!(expanded.routable["project"].owner, OwnerRef::project(4));
        assert_eq!(expanded.routable["service"].owner, OwnerRef::service(2));
        assert_eq!(expanded.data["externalURL"], "http://pk.example/alert/9");
        assert_eq!(
            expanded.data["commonAnnotations"]["service"],
            "http://pk.example/service/2"
        );
        assert_eq!(expanded.common_labels()["severity"], "page");
    }

    #[tokio::test]
    async fn test_expand_unknown_entity_is_not_routable() {
        let body = json!({"commonLabels": {"project": "missing"}}).to_string();
        let expanded = expand_alert(1, &body, &StaticLookup, "http://pk")
            .await
            .unwrap();
        assert!(expanded.routable.is_empty());
    }

    #[tokio::test]
    async fn test_expand_adds_missing_sections() {
        let expanded = expand_alert(1, "{}", &StaticLookup, "http://pk")
            .await
            .unwrap();
        assert!(expanded.data["commonLabels"].is_object());
        assert!(expanded.data["commonAnnotations"].is_object());
    }

    #[tokio::test]
    async fn test_expand_rejects_non_object() {
        let result = expand_alert(1, "[1, 2]", &StaticLookup, "http://pk").await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_common_labels_stringifies() {
        let data = json!({"commonLabels": {"a": "x", "b": 3}});
        let labels = common_labels(&data);
        assert_eq!(labels["a"], "x");
        assert_eq!(labels["b"], "3");
    }
}
