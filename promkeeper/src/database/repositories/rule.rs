//! Rule repository.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{NewRule, RuleDbModel, RuleWithOwnerRow, UpsertOutcome};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::domain::{OwnerRef, RuleSource};
use crate::{Error, Result};

#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Insert or update the rule identified by `(name, owner)`.
    async fn upsert_rule(&self, rule: &NewRule) -> Result<UpsertOutcome>;
    async fn get_rule(&self, name: &str, owner: &OwnerRef) -> Result<RuleDbModel>;
    /// Enabled rules of one dialect joined with their owner's name.
    async fn list_enabled_rules(&self, source: RuleSource) -> Result<Vec<RuleWithOwnerRow>>;
    /// Names of enabled rules of one dialect.
    async fn enabled_rule_names(&self, source: RuleSource) -> Result<BTreeSet<String>>;
    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()>;
    async fn count_rules(&self) -> Result<i64>;
}

pub struct SqlxRuleRepository {
    pool: SqlitePool,
}

impl SqlxRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn differs(existing: &RuleDbModel, rule: &NewRule) -> bool {
    existing.clause != rule.clause
        || existing.duration != rule.duration
        || existing.source_type != rule.source.to_string()
        || existing.labels_map() != rule.labels
        || existing.annotations_map() != rule.annotations
}

#[async_trait]
impl RuleRepository for SqlxRuleRepository {
    async fn upsert_rule(&self, rule: &NewRule) -> Result<UpsertOutcome> {
        let pool = &self.pool;
        let labels = serde_json::to_string(&rule.labels)?;
        let annotations = serde_json::to_string(&rule.annotations)?;
        let kind = rule.owner.kind.to_string();
        let source = rule.source.to_string();

        retry_on_sqlite_busy("upsert_rule", || {
            let (labels, annotations, kind, source) = (&labels, &annotations, &kind, &source);
            async move {
                let now = now_ms();
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO rule (name, owner_kind, owner_id, clause, duration, enabled,
                                      source_type, labels, annotations, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?)
                    ON CONFLICT(name, owner_kind, owner_id) DO NOTHING
                    "#,
                )
                .bind(&rule.name)
                .bind(kind)
                .bind(rule.owner.id)
                .bind(&rule.clause)
                .bind(&rule.duration)
                .bind(source)
                .bind(labels)
                .bind(annotations)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await?
                .rows_affected()
                    > 0;

                if inserted {
                    return Ok(UpsertOutcome::Created);
                }

                let existing = sqlx::query_as::<_, RuleDbModel>(
                    "SELECT * FROM rule WHERE name = ? AND owner_kind = ? AND owner_id = ?",
                )
                .bind(&rule.name)
                .bind(kind)
                .bind(rule.owner.id)
                .fetch_one(pool)
                .await?;

                if !differs(&existing, rule) {
                    return Ok(UpsertOutcome::Unchanged);
                }

                sqlx::query(
                    r#"
                    UPDATE rule SET
                        clause = ?,
                        duration = ?,
                        source_type = ?,
                        labels = ?,
                        annotations = ?,
                        updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&rule.clause)
                .bind(&rule.duration)
                .bind(source)
                .bind(labels)
                .bind(annotations)
                .bind(now)
                .bind(existing.id)
                .execute(pool)
                .await?;

                Ok(UpsertOutcome::Updated)
            }
        })
        .await
    }

    async fn get_rule(&self, name: &str, owner: &OwnerRef) -> Result<RuleDbModel> {
        sqlx::query_as::<_, RuleDbModel>(
            "SELECT * FROM rule WHERE name = ? AND owner_kind = ? AND owner_id = ?",
        )
        .bind(name)
        .bind(owner.kind.to_string())
        .bind(owner.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("Rule", format!("{}@{}", name, owner)))
    }

    async fn list_enabled_rules(&self, source: RuleSource) -> Result<Vec<RuleWithOwnerRow>> {
        let rows = sqlx::query_as::<_, RuleWithOwnerRow>(
            r#"
            SELECT r.*,
                CASE r.owner_kind
                    WHEN 'service' THEN s.name
                    WHEN 'project' THEN p.name
                    ELSE NULL
                END AS owner_name
            FROM rule r
            LEFT JOIN service s ON r.owner_kind = 'service' AND s.id = r.owner_id
            LEFT JOIN project p ON r.owner_kind = 'project' AND p.id = r.owner_id
            WHERE r.enabled = 1 AND r.source_type = ?
            ORDER BY owner_name, r.name
            "#,
        )
        .bind(source.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn enabled_rule_names(&self, source: RuleSource) -> Result<BTreeSet<String>> {
        let names: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT name FROM rule WHERE enabled = 1 AND source_type = ?")
                .bind(source.to_string())
                .fetch_all(&self.pool)
                .await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let result = sqlx::query("UPDATE rule SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Rule", id));
        }
        Ok(())
    }

    async fn count_rules(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rule")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
