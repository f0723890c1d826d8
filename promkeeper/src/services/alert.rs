//! Alert ingestion.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::database::repositories::AlertRepository;
use crate::tasks::{Job, TaskQueue};
use crate::{Error, Result};

/// Entry point for inbound Alertmanager payloads.
pub struct AlertService {
    alerts: Arc<dyn AlertRepository>,
    queue: Arc<TaskQueue>,
}

impl AlertService {
    pub fn new(alerts: Arc<dyn AlertRepository>, queue: Arc<TaskQueue>) -> Self {
        Self { alerts, queue }
    }

    /// Persist the payload and queue it for routing. Returns the alert id.
    pub async fn ingest(&self, payload: Value) -> Result<i64> {
        if !payload.is_object() {
            return Err(Error::validation("Alert payload must be a JSON object"));
        }

        let body = serde_json::to_string(&payload)?;
        let alert_id = self.alerts.create_alert(&body).await?;
        self.queue
            .submit_default(&Job::ProcessAlert { alert_id })
            .await?;

        info!(alert_id, "Alert received");
        Ok(alert_id)
    }
}
