//! Reload requests to the monitoring system.

use chrono::Utc;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::{PostReloadEvent, ReloadEventBroadcaster};
use crate::{Error, Result};

pub struct ReloadTrigger {
    client: Client,
    url: String,
    events: ReloadEventBroadcaster,
}

impl ReloadTrigger {
    /// `base_url` is the monitoring system's root URL.
    pub fn new(client: Client, base_url: &str, events: ReloadEventBroadcaster) -> Self {
        Self {
            client,
            url: format!("{}/-/reload", base_url.trim_end_matches('/')),
            events,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the reload endpoint and broadcast the outcome.
    pub async fn reload(&self) -> Result<PostReloadEvent> {
        let (status, error) = match self.client.post(&self.url).send().await {
            Ok(response) => {
                let status = response.status();
                let error = (!status.is_success()).then(|| {
                    format!("unexpected status {}", status)
                });
                (Some(status.as_u16()), error)
            }
            Err(e) => (None, Some(e.to_string())),
        };

        let event = PostReloadEvent {
            url: self.url.clone(),
            status,
            error,
            timestamp: Utc::now(),
        };
        self.events.publish(event.clone());

        if event.is_success() {
            info!("{}", event.description());
            Ok(event)
        } else {
            warn!("{}", event.description());
            Err(Error::Other(event.description()))
        }
    }
}
