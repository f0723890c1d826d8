//! Alert repository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{AlertDbModel, AlertErrorDbModel, AlertLabelDbModel};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::{Error, Result};

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn create_alert(&self, body: &str) -> Result<i64>;
    async fn get_alert(&self, id: i64) -> Result<AlertDbModel>;
    /// Returns whether a row was deleted.
    async fn delete_alert(&self, id: i64) -> Result<bool>;

    // Counters
    async fn increment_sent(&self, id: i64) -> Result<()>;
    /// Increment `error_count` and append an error record in one transaction.
    async fn record_error(&self, id: i64, message: &str) -> Result<()>;

    // Labels and errors
    /// Upsert one row per label name; indexing the same alert twice is a no-op.
    async fn add_labels(&self, id: i64, labels: &BTreeMap<String, String>) -> Result<usize>;
    async fn list_labels(&self, id: i64) -> Result<Vec<AlertLabelDbModel>>;
    async fn list_errors(&self, id: i64) -> Result<Vec<AlertErrorDbModel>>;
}

pub struct SqlxAlertRepository {
    pool: SqlitePool,
}

impl SqlxAlertRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertRepository for SqlxAlertRepository {
    async fn create_alert(&self, body: &str) -> Result<i64> {
        let now = now_ms();
        let result = sqlx::query(
            "INSERT INTO alert (body, sent_count, error_count, created_at, updated_at) VALUES (?, 0, 0, ?, ?)",
        )
        .bind(body)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_alert(&self, id: i64) -> Result<AlertDbModel> {
        sqlx::query_as::<_, AlertDbModel>("SELECT * FROM alert WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Alert", id))
    }

    async fn delete_alert(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM alert WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_sent(&self, id: i64) -> Result<()> {
        let pool = &self.pool;
        let updated = retry_on_sqlite_busy("increment_sent", || async move {
            let result = sqlx::query(
                "UPDATE alert SET sent_count = sent_count + 1, updated_at = ? WHERE id = ?",
            )
            .bind(now_ms())
            .bind(id)
            .execute(pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if updated == 0 {
            return Err(Error::not_found("Alert", id));
        }
        Ok(())
    }

    async fn record_error(&self, id: i64, message: &str) -> Result<()> {
        let pool = &self.pool;
        retry_on_sqlite_busy("record_error", || async move {
            let now = now_ms();
            let mut tx = pool.begin().await?;

            let result = sqlx::query(
                "UPDATE alert SET error_count = error_count + 1, updated_at = ? WHERE id = ?",
            )
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(Error::not_found("Alert", id));
            }

            sqlx::query("INSERT INTO alert_error (alert_id, message, created_at) VALUES (?, ?, ?)")
                .bind(id)
                .bind(message)
                .bind(now)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn add_labels(&self, id: i64, labels: &BTreeMap<String, String>) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        for (name, value) in labels {
            sqlx::query(
                r#"
                INSERT INTO alert_label (alert_id, name, value) VALUES (?, ?, ?)
                ON CONFLICT (alert_id, name) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(labels.len())
    }

    async fn list_labels(&self, id: i64) -> Result<Vec<AlertLabelDbModel>> {
        let labels = sqlx::query_as::<_, AlertLabelDbModel>(
            "SELECT * FROM alert_label WHERE alert_id = ? ORDER BY name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(labels)
    }

    async fn list_errors(&self, id: i64) -> Result<Vec<AlertErrorDbModel>> {
        let errors = sqlx::query_as::<_, AlertErrorDbModel>(
            "SELECT * FROM alert_error WHERE alert_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(errors)
    }
}
