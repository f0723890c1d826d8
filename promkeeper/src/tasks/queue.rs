//! SQLite-backed named task queues.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::job::Job;
use crate::Result;
use crate::database::models::{TaskDbModel, TaskStatus};
use crate::database::repositories::TaskRepository;
use crate::database::time::now_ms;

/// Queue used when no host is targeted.
pub const DEFAULT_QUEUE: &str = "default";

/// Upper bound of the retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    /// Attempts before a task is marked FAILED.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each attempt.
    pub retry_delay: Duration,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// A task claimed by a worker.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub id: String,
    pub queue: String,
    pub job: Job,
    /// Attempt number, starting at 1.
    pub attempts: u32,
}

/// What happened to a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    Requeued { delay: Duration },
    Failed,
}

fn new_task(queue: &str, job: &Job) -> Result<TaskDbModel> {
    let now = now_ms();
    Ok(TaskDbModel {
        id: uuid::Uuid::new_v4().to_string(),
        queue: queue.to_string(),
        name: job.name().to_string(),
        payload: serde_json::to_string(job)?,
        status: TaskStatus::Pending.to_string(),
        attempts: 0,
        last_error: None,
        available_at: now,
        created_at: now,
        updated_at: now,
    })
}

pub struct TaskQueue {
    repo: Arc<dyn TaskRepository>,
    config: TaskQueueConfig,
    notify: Arc<Notify>,
}

impl TaskQueue {
    pub fn new(repo: Arc<dyn TaskRepository>, config: TaskQueueConfig) -> Self {
        Self {
            repo,
            config,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Persist `job` on `queue` and wake idle workers. Returns the task id.
    pub async fn submit(&self, queue: &str, job: &Job) -> Result<String> {
        let task = new_task(queue, job)?;
        self.repo.create_task(&task).await?;

        debug!(task_id = %task.id, queue = %queue, job = job.name(), "Submitted task");
        self.notify.notify_waiters();
        Ok(task.id)
    }

    /// Persist every job on `queue` in one transaction. Either all of them
    /// are queued or none is.
    pub async fn submit_all(&self, queue: &str, jobs: &[Job]) -> Result<Vec<String>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let tasks = jobs
            .iter()
            .map(|job| new_task(queue, job))
            .collect::<Result<Vec<_>>>()?;
        self.repo.create_tasks(&tasks).await?;

        debug!(queue = %queue, count = tasks.len(), "Submitted task batch");
        self.notify.notify_waiters();
        Ok(tasks.into_iter().map(|task| task.id).collect())
    }

    pub async fn submit_default(&self, job: &Job) -> Result<String> {
        self.submit(DEFAULT_QUEUE, job).await
    }

    /// Claim the next available task of `queue`.
    ///
    /// Tasks whose payload no longer parses are marked FAILED and skipped.
    pub async fn dequeue(&self, queue: &str) -> Result<Option<ClaimedTask>> {
        loop {
            let Some(row) = self.repo.claim_next(queue).await? else {
                return Ok(None);
            };

            match serde_json::from_str::<Job>(&row.payload) {
                Ok(job) => {
                    return Ok(Some(ClaimedTask {
                        id: row.id,
                        queue: row.queue,
                        job,
                        attempts: u32::try_from(row.attempts).unwrap_or(u32::MAX),
                    }));
                }
                Err(e) => {
                    warn!(task_id = %row.id, name = %row.name, error = %e, "Dropping unparseable task");
                    self.repo
                        .mark_failed(&row.id, &format!("invalid payload: {}", e))
                        .await?;
                }
            }
        }
    }

    /// Remove a finished task.
    pub async fn complete(&self, task: &ClaimedTask) -> Result<()> {
        self.repo.delete_task(&task.id).await
    }

    /// Record a failed attempt, re-queueing the task until attempts run out.
    pub async fn fail(&self, task: &ClaimedTask, error: &str) -> Result<FailureDisposition> {
        if task.attempts >= self.config.max_attempts {
            self.repo.mark_failed(&task.id, error).await?;
            warn!(
                task_id = %task.id,
                job = task.job.name(),
                attempts = task.attempts,
                "Task failed permanently: {}",
                error
            );
            return Ok(FailureDisposition::Failed);
        }

        let delay = self.retry_delay(task.attempts);
        let available_at = now_ms().saturating_add(delay.as_millis() as i64);
        self.repo.requeue(&task.id, error, available_at).await?;
        debug!(task_id = %task.id, ?delay, "Task re-queued");
        Ok(FailureDisposition::Requeued { delay })
    }

    fn retry_delay(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(16);
        self.config
            .retry_delay
            .saturating_mul(1u32 << exp)
            .min(MAX_RETRY_DELAY)
    }

    /// Reset tasks left RUNNING by a previous process.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let count = self.repo.reset_running().await?;
        if count > 0 {
            info!("Recovered {} interrupted tasks", count);
        }
        Ok(count)
    }

    pub async fn count(&self, queue: &str, status: TaskStatus) -> Result<i64> {
        self.repo.count_by_status(queue, &status.to_string()).await
    }

    /// Notifier signalled on every submission.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}
