//! Sender lookup by owning entity.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::warn;

use crate::Result;
use crate::database::models::{SenderDbModel, SenderFilterDbModel};
use crate::domain::{OwnerRef, Sender};

/// Resolves the senders bound to an owning entity.
#[async_trait]
pub trait SenderDirectory: Send + Sync {
    /// Enabled senders of `owner`, with their filters, ordered by id.
    async fn senders_for(&self, owner: &OwnerRef) -> Result<Vec<Sender>>;
}

pub struct SqlxSenderRepository {
    pool: SqlitePool,
}

impl SqlxSenderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SenderDirectory for SqlxSenderRepository {
    async fn senders_for(&self, owner: &OwnerRef) -> Result<Vec<Sender>> {
        let kind = owner.kind.to_string();

        let rows = sqlx::query_as::<_, SenderDbModel>(
            r#"
            SELECT * FROM sender
            WHERE owner_kind = ? AND owner_id = ? AND enabled = 1
            ORDER BY id
            "#,
        )
        .bind(&kind)
        .bind(owner.id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let filters = sqlx::query_as::<_, SenderFilterDbModel>(
            r#"
            SELECT f.* FROM sender_filter f
            INNER JOIN sender s ON s.id = f.sender_id
            WHERE s.owner_kind = ? AND s.owner_id = ? AND s.enabled = 1
            ORDER BY f.id
            "#,
        )
        .bind(&kind)
        .bind(owner.id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_sender: HashMap<i64, Vec<SenderFilterDbModel>> = HashMap::new();
        for filter in filters {
            by_sender.entry(filter.sender_id).or_default().push(filter);
        }

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                let filters = by_sender.remove(&id).unwrap_or_default();
                let sender = row.into_domain(filters);
                if sender.is_none() {
                    warn!(sender_id = id, "Skipping sender with unknown owner kind");
                }
                sender
            })
            .collect())
    }
}
