//! promkeeper library crate.
//!
//! Alert routing and notification dispatch, Prometheus configuration
//! rendering and publishing, and reconciliation of cluster-declared rules,
//! driven by a durable SQLite task queue.

pub mod config;
pub mod database;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod logging;
pub mod notification;
pub mod publish;
pub mod reconcile;
pub mod render;
pub mod routing;
pub mod scheduler;
pub mod services;
pub mod tasks;
pub mod utils;

pub use error::{Error, Result};
