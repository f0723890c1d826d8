//! Alert routing.
//!
//! Turns a stored alert into a deduplicated set of (driver, target) pairs:
//! blacklist first, then the enabled senders of every routable entity,
//! filtered and fanned out.

mod plan;

pub use plan::DispatchPlan;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::Result;
use crate::config::Settings;
use crate::database::repositories::{AlertRepository, SenderDirectory};
use crate::domain::{EntityLookup, ExpandedAlert, expand_alert};
use crate::notification::DriverRegistry;
use crate::tasks::{DEFAULT_QUEUE, Job, TaskQueue};

/// Result of routing one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingOutcome {
    /// Blacklisted: the alert was deleted and nothing was dispatched.
    Discarded { label: String, value: String },
    /// One `SendAlert` task was submitted per planned pair.
    Routed(DispatchPlan),
}

/// First blacklisted `(label, value)` among the alert's common labels.
pub fn blacklist_match(
    labels: &BTreeMap<String, String>,
    blacklist: &BTreeMap<String, BTreeSet<String>>,
) -> Option<(String, String)> {
    blacklist.iter().find_map(|(label, values)| {
        labels
            .get(label)
            .filter(|value| values.contains(*value))
            .map(|value| (label.clone(), value.clone()))
    })
}

pub struct AlertRouter {
    alerts: Arc<dyn AlertRepository>,
    entities: Arc<dyn EntityLookup>,
    senders: Arc<dyn SenderDirectory>,
    drivers: Arc<DriverRegistry>,
    queue: Arc<TaskQueue>,
    blacklist: BTreeMap<String, BTreeSet<String>>,
    external_url: String,
}

impl AlertRouter {
    pub fn new(
        settings: &Settings,
        alerts: Arc<dyn AlertRepository>,
        entities: Arc<dyn EntityLookup>,
        senders: Arc<dyn SenderDirectory>,
        drivers: Arc<DriverRegistry>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        Self {
            alerts,
            entities,
            senders,
            drivers,
            queue,
            blacklist: settings.alertmanager.blacklist.clone(),
            external_url: settings.external_url.clone(),
        }
    }

    /// Load and expand a stored alert.
    pub async fn expand(&self, alert_id: i64) -> Result<ExpandedAlert> {
        let alert = self.alerts.get_alert(alert_id).await?;
        expand_alert(alert_id, &alert.body, self.entities.as_ref(), &self.external_url).await
    }

    /// Route a stored alert and submit its follow-up tasks.
    pub async fn process_alert(&self, alert_id: i64) -> Result<RoutingOutcome> {
        let expanded = self.expand(alert_id).await?;

        if let Some((label, value)) = blacklist_match(&expanded.common_labels(), &self.blacklist)
        {
            self.alerts.delete_alert(alert_id).await?;
            info!(alert_id, %label, %value, "Discarded blacklisted alert");
            return Ok(RoutingOutcome::Discarded { label, value });
        }

        // Indexing never blocks routing.
        if let Err(e) = self
            .queue
            .submit_default(&Job::IndexAlert { alert_id })
            .await
        {
            warn!(alert_id, error = %e, "Failed to submit label indexing");
        }

        let plan = self.resolve(&expanded).await?;
        let sends: Vec<Job> = plan
            .iter()
            .map(|unit| Job::SendAlert {
                driver: unit.driver,
                target: unit.target,
                payload: expanded.data.clone(),
                alert_id: Some(alert_id),
            })
            .collect();
        // All or nothing: a retried pass never finds some sends already queued.
        self.queue.submit_all(DEFAULT_QUEUE, &sends).await?;

        info!(alert_id, deliveries = plan.len(), "Routed alert");
        Ok(RoutingOutcome::Routed(plan))
    }

    /// Compute the dispatch plan of an expanded alert without submitting it.
    pub async fn resolve(&self, expanded: &ExpandedAlert) -> Result<DispatchPlan> {
        let mut plan = DispatchPlan::new();

        for (label, entity) in &expanded.routable {
            let senders = self.senders.senders_for(&entity.owner).await?;
            for sender in senders {
                if !sender.matches(&expanded.data) {
                    debug!(sender_id = sender.id, %label, "Sender filter rejected alert");
                    continue;
                }

                let driver = match self.drivers.get(&sender.driver) {
                    Ok(driver) => driver,
                    Err(_) => {
                        // Dispatch reports the unknown driver.
                        plan.insert(sender.driver, sender.value);
                        continue;
                    }
                };

                if !driver.supports_splay() {
                    plan.insert(sender.driver, sender.value);
                    continue;
                }

                match driver.splay(&sender.value).await {
                    Ok(targets) => plan.extend(targets),
                    Err(e) => warn!(
                        sender_id = sender.id,
                        driver = %sender.driver,
                        error = %e,
                        "Fan-out failed"
                    ),
                }
            }
        }

        Ok(plan)
    }

    /// Store one label row per common label.
    pub async fn index_alert(&self, alert_id: i64) -> Result<usize> {
        let alert = self.alerts.get_alert(alert_id).await?;
        let data: serde_json::Value = serde_json::from_str(&alert.body)?;
        let labels = crate::domain::common_labels(&data);
        self.alerts.add_labels(alert_id, &labels).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blacklist(entries: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        entries
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    fn labels(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_blacklist_keeps_unlisted_values() {
        let alert = labels(&[("severity", "page"), ("team", "infra")]);
        assert_eq!(blacklist_match(&alert, &blacklist(&[("severity", &["info"])])), None);
    }

    #[test]
    fn test_blacklist_matches_listed_value() {
        let alert = labels(&[("severity", "page"), ("team", "infra")]);
        assert_eq!(
            blacklist_match(&alert, &blacklist(&[("severity", &["page"])])),
            Some(("severity".to_string(), "page".to_string()))
        );
    }

    #[test]
    fn test_blacklist_first_match_wins() {
        let alert = labels(&[("env", "dev"), ("severity", "info")]);
        let list = blacklist(&[("env", &["dev"]), ("severity", &["info"])]);
        assert_eq!(blacklist_match(&alert, &list).unwrap().0, "env");
    }
}
