//! Sender database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{OwnerRef, Sender, SenderFilter};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SenderDbModel {
    pub id: i64,
    pub owner_kind: String,
    pub owner_id: i64,
    pub driver: String,
    pub value: String,
    pub alias: String,
    pub enabled: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SenderFilterDbModel {
    pub id: i64,
    pub sender_id: i64,
    pub name: String,
    pub value: String,
}

impl SenderDbModel {
    /// Convert into the domain type. Rows with an unknown owner kind yield `None`.
    pub fn into_domain(self, filters: Vec<SenderFilterDbModel>) -> Option<Sender> {
        let owner = OwnerRef::from_columns(&self.owner_kind, self.owner_id)?;
        Some(Sender {
            id: self.id,
            owner,
            driver: self.driver,
            value: self.value,
            alias: self.alias,
            enabled: self.enabled,
            filters: filters
                .into_iter()
                .map(|f| SenderFilter {
                    name: f.name,
                    value: f.value,
                })
                .collect(),
        })
    }
}
