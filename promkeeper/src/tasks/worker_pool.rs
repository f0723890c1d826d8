//! Worker pool draining one named queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::job::Job;
use super::queue::{FailureDisposition, TaskQueue};
use crate::Result;

/// Executes jobs claimed from a queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Workers claiming from the queue; bounds concurrent jobs.
    pub max_workers: usize,
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval: Duration::from_millis(500),
        }
    }
}

pub struct WorkerPool {
    queue_name: String,
    config: WorkerPoolConfig,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(queue_name: impl Into<String>, config: WorkerPoolConfig) -> Self {
        Self {
            queue_name: queue_name.into(),
            config,
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Spawn the workers.
    pub fn start(&self, queue: Arc<TaskQueue>, handler: Arc<dyn JobHandler>) {
        info!(
            "Starting worker pool for queue '{}' with {} workers",
            self.queue_name, self.config.max_workers
        );

        let mut tasks = self.tasks.lock();
        let Some(join_set) = tasks.as_mut() else {
            warn!("Worker pool for '{}' already stopped", self.queue_name);
            return;
        };

        for i in 0..self.config.max_workers {
            let cancellation_token = self.cancellation_token.clone();
            let queue = queue.clone();
            let handler = handler.clone();
            let notifier = queue.notifier();
            let queue_name = self.queue_name.clone();
            let poll_interval = self.config.poll_interval;

            join_set.spawn(async move {
                debug!("Worker {}/{} started", queue_name, i);

                loop {
                    if cancellation_token.is_cancelled() {
                        break;
                    }

                    let task = match queue.dequeue(&queue_name).await {
                        Ok(Some(task)) => task,
                        Ok(None) => {
                            tokio::select! {
                                _ = cancellation_token.cancelled() => break,
                                _ = notifier.notified() => {}
                                _ = tokio::time::sleep(poll_interval) => {}
                            }
                            continue;
                        }
                        Err(e) => {
                            error!("Error dequeuing from '{}': {}", queue_name, e);
                            tokio::time::sleep(poll_interval).await;
                            continue;
                        }
                    };

                    debug!(
                        "Worker {}/{} running task {} ({}, attempt {})",
                        queue_name,
                        i,
                        task.id,
                        task.job.name(),
                        task.attempts
                    );

                    match handler.handle(&task.job).await {
                        Ok(()) => {
                            if let Err(e) = queue.complete(&task).await {
                                error!("Failed to complete task {}: {}", task.id, e);
                            }
                        }
                        Err(e) => {
                            warn!(
                                "Task {} ({}) failed: {}",
                                task.id,
                                task.job.name(),
                                e
                            );
                            match queue.fail(&task, &e.to_string()).await {
                                Ok(FailureDisposition::Requeued { delay }) => {
                                    debug!("Task {} retries in {:?}", task.id, delay)
                                }
                                Ok(FailureDisposition::Failed) => {}
                                Err(e) => error!("Failed to record failure of {}: {}", task.id, e),
                            }
                        }
                    }
                }

                debug!("Worker {}/{} shutting down", queue_name, i);
            });
        }
    }

    /// Stop the pool and wait for in-flight jobs.
    pub async fn stop(&self) {
        info!("Stopping worker pool for queue '{}'", self.queue_name);
        self.cancellation_token.cancel();

        let join_set = {
            let mut tasks = self.tasks.lock();
            tasks.take()
        };

        if let Some(mut join_set) = join_set {
            while join_set.join_next().await.is_some() {}
        }

        info!("Worker pool for queue '{}' stopped", self.queue_name);
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn is_running(&self) -> bool {
        !self.cancellation_token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.max_workers, 4);
    }

    #[test]
    fn test_worker_pool_creation() {
        let pool = WorkerPool::new("default", WorkerPoolConfig::default());
        assert_eq!(pool.queue_name(), "default");
        assert!(pool.is_running());
    }
}
