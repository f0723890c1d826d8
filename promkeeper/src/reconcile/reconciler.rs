//! Watch reconciler.
//!
//! One reconciler consumes one watch stream:
//!
//! ```text
//! Connecting -> Streaming -> Reconnecting -> Connecting ...
//!                                   \-> Stopped (cancellation only)
//! ```
//!
//! There is no checkpoint. Every reconnect replays the full object set as
//! ADDED events, so the ADDED path must be idempotent: services are
//! get-or-create by name and rules are upserted by (name, owner).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::remote::{ObjectMeta, ObjectStore, WatchEvent, WatchEventType, WatchSource, WatchedResource};
use crate::Result;
use crate::config::{MANAGED_BY_LABEL, Settings};
use crate::database::repositories::EntityRepository;
use crate::domain::{OwnerRef, RuleFile, RuleGroup};
use crate::render::{ConfigRenderer, ImportCounters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ReconcilerState {
    Connecting,
    Streaming,
    Reconnecting,
    Stopped,
}

/// Notified when an import changed stored rules.
#[async_trait]
pub trait RulesChanged: Send + Sync {
    async fn rules_changed(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub namespace: String,
    /// Required value of the managed-by label.
    pub marker: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReconcilerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            namespace: settings.kubernetes.namespace.clone(),
            marker: settings.kubernetes.ownership_marker.clone(),
            initial_backoff: Duration::from_millis(settings.reconcile.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.reconcile.max_backoff_ms),
        }
    }
}

/// Exponential backoff: `base * 2^attempt`, capped at `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(attempt);
    std::cmp::min(base.saturating_mul(multiplier), max)
}

/// What an ADDED event did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddedReport {
    pub counters: ImportCounters,
    pub groups: usize,
    /// Groups whose import failed.
    pub failed_groups: usize,
    /// Whether the object was deleted for lacking the ownership marker.
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    Added(AddedReport),
    /// MODIFIED, DELETED and BOOKMARK events.
    Ignored,
    /// The server reported an error; the stream must be reopened.
    StreamError,
}

pub struct WatchReconciler {
    resource: WatchedResource,
    source: Arc<dyn WatchSource>,
    store: Arc<dyn ObjectStore>,
    entities: Arc<dyn EntityRepository>,
    renderer: Arc<ConfigRenderer>,
    on_change: Option<Arc<dyn RulesChanged>>,
    config: ReconcilerConfig,
    state: watch::Sender<ReconcilerState>,
}

impl WatchReconciler {
    pub fn new(
        resource: WatchedResource,
        source: Arc<dyn WatchSource>,
        store: Arc<dyn ObjectStore>,
        entities: Arc<dyn EntityRepository>,
        renderer: Arc<ConfigRenderer>,
        config: ReconcilerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ReconcilerState::Connecting);
        Self {
            resource,
            source,
            store,
            entities,
            renderer,
            on_change: None,
            config,
            state,
        }
    }

    pub fn with_change_hook(mut self, hook: Arc<dyn RulesChanged>) -> Self {
        self.on_change = Some(hook);
        self
    }

    pub fn resource(&self) -> &WatchedResource {
        &self.resource
    }

    pub fn state(&self) -> ReconcilerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ReconcilerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ReconcilerState) {
        self.state.send_replace(state);
    }

    /// Drive the watch until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let resource = self.resource.clone();
        let mut attempt: u32 = 0;

        info!(%resource, namespace = %self.config.namespace, "Reconciler started");

        'outer: loop {
            self.set_state(ReconcilerState::Connecting);

            let opened = tokio::select! {
                _ = cancel.cancelled() => break 'outer,
                opened = self.source.watch(&resource, &self.config.namespace) => opened,
            };

            match opened {
                Ok(mut stream) => {
                    attempt = 0;
                    self.set_state(ReconcilerState::Streaming);
                    info!(%resource, "Watch connected");

                    loop {
                        let next = tokio::select! {
                            _ = cancel.cancelled() => break 'outer,
                            next = stream.next() => next,
                        };

                        match next {
                            Some(Ok(event)) => {
                                if self.handle_event(&event).await == EventAction::StreamError {
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                warn!(%resource, "Watch stream error: {}", e);
                                break;
                            }
                            None => {
                                debug!(%resource, "Watch stream ended");
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!(%resource, "Failed to open watch: {}", e),
            }

            self.set_state(ReconcilerState::Reconnecting);
            let delay = backoff_delay(attempt, self.config.initial_backoff, self.config.max_backoff);
            attempt = attempt.saturating_add(1);
            info!(%resource, attempt, ?delay, "Reconnecting watch");

            tokio::select! {
                _ = cancel.cancelled() => break 'outer,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ReconcilerState::Stopped);
        info!(%resource, "Reconciler stopped");
    }

    /// Process one watch event.
    pub async fn handle_event(&self, event: &WatchEvent) -> EventAction {
        match event.event_type {
            WatchEventType::Added => EventAction::Added(self.handle_added(&event.object).await),
            WatchEventType::Error => {
                warn!(resource = %self.resource, object = %event.object, "Watch reported an error");
                EventAction::StreamError
            }
            other => {
                debug!(
                    resource = %self.resource,
                    name = %ObjectMeta::of(&event.object).name,
                    "Ignoring {} event",
                    other
                );
                EventAction::Ignored
            }
        }
    }

    async fn handle_added(&self, object: &Value) -> AddedReport {
        let meta = ObjectMeta::of(object);
        let groups = self.extract_groups(object, &meta);
        let mut report = AddedReport {
            groups: groups.len(),
            ..Default::default()
        };

        for group in groups {
            let name = group.name.clone();
            match self.import_group(group).await {
                Ok(counters) => report.counters += counters,
                Err(e) => {
                    report.failed_groups += 1;
                    error!(object = %meta.name, group = %name, "Rule group import failed: {}", e);
                }
            }
        }

        if report.counters.changed()
            && let Some(hook) = &self.on_change
            && let Err(e) = hook.rules_changed().await
        {
            warn!(object = %meta.name, "Failed to request rules publish: {}", e);
        }

        report.deleted = self.reclaim(&meta).await;

        info!(
            resource = %self.resource,
            object = %meta.name,
            groups = report.groups,
            failed = report.failed_groups,
            created = report.counters.created,
            updated = report.counters.updated,
            deleted = report.deleted,
            "Processed ADDED object"
        );
        report
    }

    fn extract_groups(&self, object: &Value, meta: &ObjectMeta) -> Vec<RuleGroup> {
        match &self.resource {
            WatchedResource::PrometheusRules => {
                let Some(groups) = object.pointer("/spec/groups") else {
                    return Vec::new();
                };
                serde_json::from_value(groups.clone()).unwrap_or_else(|e| {
                    warn!(object = %meta.name, "Invalid spec.groups: {}", e);
                    Vec::new()
                })
            }
            WatchedResource::RuleConfigMaps { .. } => {
                let Some(data) = object.get("data").and_then(Value::as_object) else {
                    return Vec::new();
                };
                let mut groups = Vec::new();
                for (file, text) in data {
                    let Some(text) = text.as_str() else {
                        continue;
                    };
                    match RuleFile::from_yaml(text) {
                        Ok(parsed) => groups.extend(parsed.groups),
                        Err(e) => warn!(object = %meta.name, %file, "Skipping unparseable rule file: {}", e),
                    }
                }
                groups
            }
        }
    }

    async fn import_group(&self, group: RuleGroup) -> Result<ImportCounters> {
        let (service, created) = self.entities.get_or_create_service(&group.name).await?;
        if created {
            info!(service = %service.name, "Created service from watched rule group");
        }
        self.renderer
            .import_rules(
                &RuleFile::single(group),
                &OwnerRef::service(service.id),
                self.resource.source(),
            )
            .await
    }

    /// Delete the object unless it carries the ownership marker. Returns
    /// whether it was deleted.
    async fn reclaim(&self, meta: &ObjectMeta) -> bool {
        if meta.label(MANAGED_BY_LABEL) == Some(self.config.marker.as_str()) {
            return false;
        }
        if meta.name.is_empty() {
            warn!(resource = %self.resource, "Cannot reclaim object without a name");
            return false;
        }

        let namespace = meta
            .namespace
            .as_deref()
            .unwrap_or(&self.config.namespace);
        match self
            .store
            .delete(self.resource.kind(), namespace, &meta.name)
            .await
        {
            Ok(()) => {
                info!(object = %meta.name, %namespace, "Deleted unowned object");
                true
            }
            Err(e) => {
                warn!(object = %meta.name, %namespace, "Failed to delete unowned object: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        assert_eq!(backoff_delay(0, base, max), Duration::from_secs(1));
        assert_eq!(backoff_delay(3, base, max), Duration::from_secs(8));
        assert_eq!(backoff_delay(10, base, max), max);
        assert_eq!(backoff_delay(u32::MAX, base, max), max);
    }
}
