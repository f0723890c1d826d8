//! Generic webhook driver: POSTs the alert payload as JSON to the target URL.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::NotificationDriver;
use crate::{Error, Result};

pub struct WebhookDriver {
    client: Client,
}

impl WebhookDriver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationDriver for WebhookDriver {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, target: &str, payload: &Value) -> Result<()> {
        let response = self
            .client
            .post(target)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::delivery("webhook", format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Webhook failed: {} - {}", status, body);
            return Err(Error::delivery(
                "webhook",
                format!("{} - {}", status, body),
            ));
        }

        debug!(target = %target, "Webhook notification sent");
        Ok(())
    }
}
