//! `user` driver: a target naming a user fans out to that user's senders.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{DeliveryTarget, NotificationDriver};
use crate::database::repositories::SenderDirectory;
use crate::domain::{EntityLookup, OwnerKind};
use crate::{Error, Result};

pub struct UserDriver {
    entities: Arc<dyn EntityLookup>,
    senders: Arc<dyn SenderDirectory>,
}

impl UserDriver {
    pub fn new(entities: Arc<dyn EntityLookup>, senders: Arc<dyn SenderDirectory>) -> Self {
        Self { entities, senders }
    }
}

#[async_trait]
impl NotificationDriver for UserDriver {
    fn name(&self) -> &'static str {
        "user"
    }

    async fn send(&self, target: &str, _payload: &Value) -> Result<()> {
        Err(Error::delivery(
            "user",
            format!("user {} is delivered through its own senders", target),
        ))
    }

    fn supports_splay(&self) -> bool {
        true
    }

    /// Enabled senders of the named user. Nested `user` senders are dropped.
    async fn splay(&self, target: &str) -> Result<Vec<DeliveryTarget>> {
        let Some(user) = self.entities.find_by_name(OwnerKind::User, target).await? else {
            return Err(Error::not_found("User", target));
        };

        Ok(self
            .senders
            .senders_for(&user.owner)
            .await?
            .into_iter()
            .filter(|s| s.driver != self.name())
            .map(|s| DeliveryTarget::new(s.driver, s.value))
            .collect())
    }
}
