//! Task queue models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Task status as stored in the `task` table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskDbModel {
    pub id: String,
    pub queue: String,
    pub name: String,
    /// JSON-serialized job.
    pub payload: String,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub available_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskDbModel {
    pub fn status(&self) -> Option<TaskStatus> {
        self.status.parse().ok()
    }
}
