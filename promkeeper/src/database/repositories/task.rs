//! Task repository backing the durable queue.

use async_trait::async_trait;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqlitePool};

use crate::database::models::TaskDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::{Error, Result};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create_task(&self, task: &TaskDbModel) -> Result<()>;
    /// Insert every task in one transaction: all of them or none.
    async fn create_tasks(&self, tasks: &[TaskDbModel]) -> Result<()>;
    async fn get_task(&self, id: &str) -> Result<TaskDbModel>;
    /// Atomically claim the oldest available pending task of `queue`.
    async fn claim_next(&self, queue: &str) -> Result<Option<TaskDbModel>>;
    async fn delete_task(&self, id: &str) -> Result<()>;
    /// Put a claimed task back to pending, available at `available_at`.
    async fn requeue(&self, id: &str, error: &str, available_at: i64) -> Result<()>;
    async fn mark_failed(&self, id: &str, error: &str) -> Result<()>;
    /// Reset RUNNING tasks to PENDING. Returns the number of tasks reset.
    async fn reset_running(&self) -> Result<u64>;
    async fn count_by_status(&self, queue: &str, status: &str) -> Result<i64>;
}

fn insert_task(task: &TaskDbModel) -> sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO task (id, queue, name, payload, status, attempts, last_error,
                          available_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task.id)
    .bind(&task.queue)
    .bind(&task.name)
    .bind(&task.payload)
    .bind(&task.status)
    .bind(task.attempts)
    .bind(&task.last_error)
    .bind(task.available_at)
    .bind(task.created_at)
    .bind(task.updated_at)
}

pub struct SqlxTaskRepository {
    pool: SqlitePool,
}

impl SqlxTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqlxTaskRepository {
    async fn create_task(&self, task: &TaskDbModel) -> Result<()> {
        let pool = &self.pool;
        retry_on_sqlite_busy("create_task", || async move {
            insert_task(task).execute(pool).await?;
            Ok(())
        })
        .await
    }

    async fn create_tasks(&self, tasks: &[TaskDbModel]) -> Result<()> {
        let pool = &self.pool;
        retry_on_sqlite_busy("create_tasks", || async move {
            let mut tx = pool.begin().await?;
            for task in tasks {
                insert_task(task).execute(&mut *tx).await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn get_task(&self, id: &str) -> Result<TaskDbModel> {
        sqlx::query_as::<_, TaskDbModel>("SELECT * FROM task WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Task", id))
    }

    async fn claim_next(&self, queue: &str) -> Result<Option<TaskDbModel>> {
        let pool = &self.pool;
        retry_on_sqlite_busy("claim_next_task", || async move {
            let now = now_ms();
            let task = sqlx::query_as::<_, TaskDbModel>(
                r#"
                UPDATE task SET
                    status = 'RUNNING',
                    attempts = attempts + 1,
                    updated_at = ?
                WHERE id = (
                    SELECT id FROM task
                    WHERE queue = ? AND status = 'PENDING' AND available_at <= ?
                    ORDER BY available_at, created_at
                    LIMIT 1
                )
                AND status = 'PENDING'
                RETURNING *
                "#,
            )
            .bind(now)
            .bind(queue)
            .bind(now)
            .fetch_optional(pool)
            .await?;
            Ok(task)
        })
        .await
    }

    async fn delete_task(&self, id: &str) -> Result<()> {
        let pool = &self.pool;
        retry_on_sqlite_busy("delete_task", || async move {
            sqlx::query("DELETE FROM task WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn requeue(&self, id: &str, error: &str, available_at: i64) -> Result<()> {
        let pool = &self.pool;
        retry_on_sqlite_busy("requeue_task", || async move {
            sqlx::query(
                r#"
                UPDATE task SET status = 'PENDING', last_error = ?, available_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(error)
            .bind(available_at)
            .bind(now_ms())
            .bind(id)
            .execute(pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        let pool = &self.pool;
        retry_on_sqlite_busy("mark_task_failed", || async move {
            sqlx::query(
                "UPDATE task SET status = 'FAILED', last_error = ?, updated_at = ? WHERE id = ?",
            )
            .bind(error)
            .bind(now_ms())
            .bind(id)
            .execute(pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn reset_running(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE task SET status = 'PENDING', updated_at = ? WHERE status = 'RUNNING'",
        )
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, queue: &str, status: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM task WHERE queue = ? AND status = ?")
                .bind(queue)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
