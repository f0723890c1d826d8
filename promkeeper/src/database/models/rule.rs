//! Rule database models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{OwnerRef, RuleSource};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RuleDbModel {
    pub id: i64,
    pub name: String,
    pub owner_kind: String,
    pub owner_id: i64,
    pub clause: String,
    pub duration: String,
    pub enabled: bool,
    pub source_type: String,
    /// JSON object of rule labels.
    pub labels: String,
    /// JSON object of rule annotations.
    pub annotations: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RuleDbModel {
    pub fn owner(&self) -> Option<OwnerRef> {
        OwnerRef::from_columns(&self.owner_kind, self.owner_id)
    }

    pub fn labels_map(&self) -> BTreeMap<String, String> {
        serde_json::from_str(&self.labels).unwrap_or_default()
    }

    pub fn annotations_map(&self) -> BTreeMap<String, String> {
        serde_json::from_str(&self.annotations).unwrap_or_default()
    }
}

/// Rule row joined with the display name of its owner.
#[derive(Debug, Clone, FromRow)]
pub struct RuleWithOwnerRow {
    #[sqlx(flatten)]
    pub rule: RuleDbModel,
    /// `None` for site-wide rules.
    pub owner_name: Option<String>,
}

/// Values written by a rule upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRule {
    pub name: String,
    pub owner: OwnerRef,
    pub clause: String,
    pub duration: String,
    pub source: RuleSource,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// Effect of a rule upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}
