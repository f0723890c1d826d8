//! Telegram Bot API driver.
//!
//! The target is a chat id; the bot token comes from settings. 429 responses
//! are retried after `parameters.retry_after` from the response body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{NotificationDriver, summarize, truncate};
use crate::{Error, Result};

const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

pub struct TelegramDriver {
    client: Client,
    bot_token: Option<String>,
    api_base: String,
}

impl TelegramDriver {
    pub fn new(client: Client, bot_token: Option<String>) -> Self {
        Self {
            client,
            bot_token,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Override the Bot API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn build_message(chat_id: &str, payload: &Value) -> Value {
        let (title, body) = summarize(payload);
        let text = if body.is_empty() {
            title
        } else {
            format!("{}\n\n{}", title, body)
        };
        json!({
            "chat_id": chat_id,
            "text": truncate(&text, TELEGRAM_MESSAGE_LIMIT),
        })
    }
}

#[async_trait]
impl NotificationDriver for TelegramDriver {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, target: &str, payload: &Value) -> Result<()> {
        let Some(token) = self.bot_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(Error::delivery("telegram", "no bot token configured"));
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let message = Self::build_message(target, payload);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .json(&message)
                .send()
                .await
                .map_err(|e| Error::delivery("telegram", format!("request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                debug!(chat_id = %target, "Telegram notification sent");
                return Ok(());
            }

            if status.as_u16() == 429 {
                let body: Value = response.json().await.unwrap_or_default();
                let retry_after = body
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(Value::as_u64)
                    .map(Duration::from_secs);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Telegram rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::delivery(
                        "telegram",
                        format!("rate limit exceeded after {} retries", MAX_RATE_LIMIT_RETRIES),
                    ));
                }

                tokio::time::sleep(retry_after.unwrap_or(Duration::from_secs(1))).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            warn!("Telegram sendMessage failed: {} - {}", status, body);
            return Err(Error::delivery("telegram", format!("{} - {}", status, body)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_message() {
        let message = TelegramDriver::build_message(
            "-100123",
            &json!({"commonLabels": {"alertname": "Down"}}),
        );
        assert_eq!(message["chat_id"], "-100123");
        assert_eq!(message["text"], "[FIRING] Down");
    }

    #[tokio::test]
    async fn test_send_without_token_fails() {
        crate::utils::http_client::install_rustls_provider();
        let driver = TelegramDriver::new(Client::new(), None);
        let err = driver.send("1", &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Delivery { .. }));
    }
}
