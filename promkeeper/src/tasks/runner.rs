//! Executes queued jobs against the routing, dispatch and publish layers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::job::Job;
use super::worker_pool::JobHandler;
use crate::dispatch::{DeliveryOutcome, DispatchEngine};
use crate::publish::PublishService;
use crate::routing::{AlertRouter, RoutingOutcome};
use crate::{Error, Result};

pub struct TaskRunner {
    router: Arc<AlertRouter>,
    dispatch: Arc<DispatchEngine>,
    publish: Arc<PublishService>,
}

impl TaskRunner {
    pub fn new(
        router: Arc<AlertRouter>,
        dispatch: Arc<DispatchEngine>,
        publish: Arc<PublishService>,
    ) -> Self {
        Self {
            router,
            dispatch,
            publish,
        }
    }
}

/// A vanished alert ends the job instead of retrying it.
fn done_if_gone(job: &str, result: Result<()>) -> Result<()> {
    match result {
        Err(Error::NotFound { entity_type, id }) => {
            warn!(job, %entity_type, %id, "Job target no longer exists");
            Ok(())
        }
        other => other,
    }
}

#[async_trait]
impl JobHandler for TaskRunner {
    async fn handle(&self, job: &Job) -> Result<()> {
        match job {
            Job::ProcessAlert { alert_id } => {
                let result = self.router.process_alert(*alert_id).await.map(|outcome| {
                    match outcome {
                        RoutingOutcome::Discarded { label, value } => {
                            info!(alert_id, %label, %value, "Alert blacklisted")
                        }
                        RoutingOutcome::Routed(plan) => {
                            debug!(alert_id, targets = plan.len(), "Alert routed")
                        }
                    }
                });
                done_if_gone(job.name(), result)
            }
            Job::IndexAlert { alert_id } => {
                let result = self.router.index_alert(*alert_id).await.map(|_| ());
                done_if_gone(job.name(), result)
            }
            Job::SendAlert {
                driver,
                target,
                payload,
                alert_id,
            } => {
                let result = self
                    .dispatch
                    .deliver(driver, target, payload, *alert_id)
                    .await
                    .map(|outcome| {
                        if let DeliveryOutcome::Failed { message } = outcome {
                            debug!(?alert_id, %driver, "Delivery recorded as failed: {}", message);
                        }
                    });
                done_if_gone(job.name(), result)
            }
            Job::WriteConfig { path, reload } => {
                self.publish
                    .write_config(path.as_deref(), *reload, None)
                    .await
            }
            Job::WriteUrls { path, reload } => {
                self.publish.write_urls(path.as_deref(), *reload, None).await
            }
            Job::WriteRules { path, reload } => {
                self.publish
                    .write_rules(path.as_deref(), *reload, None)
                    .await
            }
            Job::ReloadPrometheus => self.publish.reload().await,
        }
    }
}
