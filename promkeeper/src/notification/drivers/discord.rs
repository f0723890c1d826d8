//! Discord webhook driver.
//!
//! The target is a Discord webhook URL. Rate limits are handled the way
//! Discord recommends:
//! - Parses response headers (Retry-After, X-RateLimit-Reset-After)
//! - Retries on 429 responses

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{NotificationDriver, summarize, truncate};
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Discord message content limit.
const DISCORD_CONTENT_LIMIT: usize = 2000;

pub struct DiscordDriver {
    client: Client,
    username: Option<String>,
}

impl DiscordDriver {
    pub fn new(client: Client, username: Option<String>) -> Self {
        Self { client, username }
    }

    fn build_message(&self, payload: &Value) -> Value {
        let (title, body) = summarize(payload);
        let content = if body.is_empty() {
            format!("**{}**", title)
        } else {
            format!("**{}**\n{}", title, body)
        };

        let mut message = json!({ "content": truncate(&content, DISCORD_CONTENT_LIMIT) });
        if let Some(username) = &self.username {
            message["username"] = json!(username);
        }
        message
    }

    async fn send_with_retry(&self, url: &str, message: &Value) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(url)
                .json(message)
                .send()
                .await
                .map_err(|e| Error::delivery("discord", format!("request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let retry_after = parse_retry_after(&response);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Discord rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::delivery(
                        "discord",
                        format!("rate limit exceeded after {} retries", MAX_RATE_LIMIT_RETRIES),
                    ));
                }

                let wait = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Discord rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            warn!("Discord webhook failed: {} - {}", status, body);
            return Err(Error::delivery("discord", format!("{} - {}", status, body)));
        }
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .into_iter()
        .find_map(|header| {
            response
                .headers()
                .get(header)?
                .to_str()
                .ok()?
                .parse::<f64>()
                .ok()
        })
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl NotificationDriver for DiscordDriver {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, target: &str, payload: &Value) -> Result<()> {
        let message = self.build_message(payload);
        self.send_with_retry(target, &message).await?;
        debug!("Discord notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_message() {
        crate::utils::http_client::install_rustls_provider();
        let driver = DiscordDriver::new(Client::new(), Some("pk".to_string()));
        let message = driver.build_message(&json!({
            "status": "firing",
            "commonLabels": {"alertname": "HighLoad"},
            "commonAnnotations": {"summary": "load > 10"}
        }));
        assert_eq!(message["username"], "pk");
        let content = message["content"].as_str().unwrap();
        assert!(content.starts_with("**[FIRING] HighLoad**"));
        assert!(content.contains("load > 10"));
    }

    #[test]
    fn test_build_message_without_username() {
        crate::utils::http_client::install_rustls_provider();
        let driver = DiscordDriver::new(Client::new(), None);
        let message = driver.build_message(&json!({}));
        assert!(message.get("username").is_none());
    }
}
