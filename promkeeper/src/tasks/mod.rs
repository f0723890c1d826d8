//! Durable task queue and its workers.
//!
//! Jobs are persisted in the `task` table and executed at least once by
//! [`WorkerPool`]s, one pool per consumed queue.

mod job;
mod queue;
mod runner;
mod worker_pool;

pub use job::Job;
pub use queue::{ClaimedTask, DEFAULT_QUEUE, FailureDisposition, TaskQueue, TaskQueueConfig};
pub use runner::TaskRunner;
pub use worker_pool::{JobHandler, WorkerPool, WorkerPoolConfig};
