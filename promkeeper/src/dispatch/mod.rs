//! Per-target delivery with alert accounting.
//!
//! Each (driver, target) unit is delivered independently. With an alert
//! context, failures are recorded on the alert and swallowed; without one
//! they propagate to the caller.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::database::repositories::AlertRepository;
use crate::notification::DriverRegistry;
use crate::{Error, Result};

/// Result of one delivery attempt within an alert context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// Driver failed; recorded against the alert.
    Failed { message: String },
    /// Driver name is not registered; nothing recorded.
    DriverUnavailable,
}

pub struct DispatchEngine {
    drivers: Arc<DriverRegistry>,
    alerts: Arc<dyn AlertRepository>,
}

impl DispatchEngine {
    pub fn new(drivers: Arc<DriverRegistry>, alerts: Arc<dyn AlertRepository>) -> Self {
        Self { drivers, alerts }
    }

    pub async fn deliver(
        &self,
        driver: &str,
        target: &str,
        payload: &Value,
        alert_id: Option<i64>,
    ) -> Result<DeliveryOutcome> {
        let resolved = match self.drivers.get(driver) {
            Ok(d) => d,
            Err(e) => {
                let Some(alert_id) = alert_id else {
                    return Err(e);
                };
                error!(alert_id, %driver, "Cannot deliver: {}", e);
                return Ok(DeliveryOutcome::DriverUnavailable);
            }
        };

        match resolved.send(target, payload).await {
            Ok(()) => {
                if let Some(alert_id) = alert_id {
                    self.alerts.increment_sent(alert_id).await?;
                }
                debug!(?alert_id, %driver, %target, "Delivered");
                Ok(DeliveryOutcome::Sent)
            }
            Err(e) => {
                let Some(alert_id) = alert_id else {
                    return Err(e);
                };
                let message = e.to_string();
                warn!(alert_id, %driver, %target, "Delivery failed: {}", message);
                self.alerts.record_error(alert_id, &message).await?;
                Ok(DeliveryOutcome::Failed { message })
            }
        }
    }

    /// Send a synthetic alert outside any alert context. Every failure
    /// propagates.
    pub async fn send_test(&self, driver: &str, target: &str) -> Result<()> {
        match self.deliver(driver, target, &test_payload(), None).await? {
            DeliveryOutcome::Sent => Ok(()),
            other => Err(Error::Other(format!(
                "Unexpected test delivery outcome: {:?}",
                other
            ))),
        }
    }
}

/// Payload used for connectivity tests.
pub fn test_payload() -> Value {
    json!({
        "status": "firing",
        "commonLabels": {
            "alertname": "PromkeeperTest",
            "severity": "info"
        },
        "commonAnnotations": {
            "summary": "Test notification"
        },
        "alerts": []
    })
}
