//! Notification drivers.
//!
//! - Generic webhooks (the alert payload as JSON)
//! - Discord webhooks
//! - Telegram Bot API
//! - `user`, which only fans out to a user's own senders

mod discord;
mod telegram;
mod user;
mod webhook;

pub use discord::DiscordDriver;
pub use telegram::TelegramDriver;
pub use user::UserDriver;
pub use webhook::WebhookDriver;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// One physical delivery unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeliveryTarget {
    pub driver: String,
    pub target: String,
}

impl DeliveryTarget {
    pub fn new(driver: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            target: target.into(),
        }
    }
}

/// A delivery backend.
#[async_trait]
pub trait NotificationDriver: Send + Sync {
    /// Name senders refer to.
    fn name(&self) -> &'static str;

    /// Deliver one payload to one target.
    async fn send(&self, target: &str, payload: &Value) -> Result<()>;

    /// Whether `splay` expands targets.
    fn supports_splay(&self) -> bool {
        false
    }

    /// Expand a logical target into physical delivery targets.
    async fn splay(&self, target: &str) -> Result<Vec<DeliveryTarget>> {
        Ok(vec![DeliveryTarget::new(self.name(), target)])
    }
}

/// Human-readable summary of an alert payload: `(title, body)`.
pub(crate) fn summarize(payload: &Value) -> (String, String) {
    let str_at = |section: &str, key: &str| {
        payload
            .get(section)
            .and_then(|s| s.get(key))
            .and_then(Value::as_str)
    };

    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("firing");
    let alertname = str_at("commonLabels", "alertname").unwrap_or("alert");
    let title = format!("[{}] {}", status.to_uppercase(), alertname);

    let mut lines = Vec::new();
    if let Some(summary) = str_at("commonAnnotations", "summary") {
        lines.push(summary.to_string());
    }
    if let Some(description) = str_at("commonAnnotations", "description") {
        lines.push(description.to_string());
    }
    if let Some(url) = payload.get("externalURL").and_then(Value::as_str) {
        lines.push(url.to_string());
    }
    (title, lines.join("\n"))
}

/// Truncate `text` to at most `limit` characters.
pub(crate) fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit.saturating_sub(suffix.len());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summarize() {
        let payload = json!({
            "status": "resolved",
            "commonLabels": {"alertname": "DiskFull"},
            "commonAnnotations": {"summary": "disk at 99%"},
            "externalURL": "http://pk/alert/1"
        });
        let (title, body) = summarize(&payload);
        assert_eq!(title, "[RESOLVED] DiskFull");
        assert_eq!(body, "disk at 99%\nhttp://pk/alert/1");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 100), "hello");
        let long = "a".repeat(5000);
        let out = truncate(&long, 2000);
        assert!(out.chars().count() <= 2000);
        assert!(out.ends_with("[truncated]"));
    }
}
