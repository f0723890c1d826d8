//! Static driver registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Client;

use super::drivers::{
    DiscordDriver, NotificationDriver, TelegramDriver, UserDriver, WebhookDriver,
};
use crate::config::Settings;
use crate::database::repositories::SenderDirectory;
use crate::domain::EntityLookup;
use crate::{Error, Result};

/// Name -> driver mapping, immutable once built.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<&'static str, Arc<dyn NotificationDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in driver.
    pub fn with_defaults(
        settings: &Settings,
        client: Client,
        entities: Arc<dyn EntityLookup>,
        senders: Arc<dyn SenderDirectory>,
    ) -> Self {
        Self::new()
            .with(WebhookDriver::new(client.clone()))
            .with(DiscordDriver::new(
                client.clone(),
                settings.drivers.discord_username.clone(),
            ))
            .with(TelegramDriver::new(
                client,
                settings.drivers.telegram_bot_token.clone(),
            ))
            .with(UserDriver::new(entities, senders))
    }

    /// Register a driver under its own name, replacing any previous one.
    pub fn with(mut self, driver: impl NotificationDriver + 'static) -> Self {
        self.drivers.insert(driver.name(), Arc::new(driver));
        self
    }

    /// Resolve a driver by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn NotificationDriver>> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDriver(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.drivers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::drivers::DeliveryTarget;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Noop;

    #[async_trait]
    impl NotificationDriver for Noop {
        fn name(&self) -> &'static str {
            "noop"
        }

        async fn send(&self, _target: &str, _payload: &Value) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lookup_registered_driver() {
        let registry = DriverRegistry::new().with(Noop);
        let driver = registry.get("noop").unwrap();
        assert!(!driver.supports_splay());
        assert_eq!(
            driver.splay("x").await.unwrap(),
            vec![DeliveryTarget::new("noop", "x")]
        );
        assert_eq!(registry.names(), vec!["noop"]);
    }

    #[test]
    fn test_unknown_driver_fails_closed() {
        let registry = DriverRegistry::new();
        match registry.get("smtp") {
            Err(Error::UnknownDriver(name)) => assert_eq!(name, "smtp"),
            other => panic!("unexpected result: {:?}", other.map(|d| d.name())),
        }
    }
}
