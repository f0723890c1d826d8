//! Alert database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One ingested alert event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AlertDbModel {
    pub id: i64,
    /// Raw JSON payload as received.
    pub body: String,
    pub sent_count: i64,
    pub error_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Label indexed from an alert's `commonLabels`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AlertLabelDbModel {
    pub id: i64,
    pub alert_id: i64,
    pub name: String,
    pub value: String,
}

/// Delivery failure recorded against an alert.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AlertErrorDbModel {
    pub id: i64,
    pub alert_id: i64,
    pub message: String,
    pub created_at: i64,
}
