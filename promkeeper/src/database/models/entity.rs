//! Monitoring-target set models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ServiceDbModel {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProjectDbModel {
    pub id: i64,
    pub name: String,
    pub service_id: i64,
    pub shard_id: i64,
    pub farm_id: Option<i64>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserDbModel {
    pub id: i64,
    pub username: String,
}

/// A Prometheus instance; its host names the task queue it consumes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PrometheusServerDbModel {
    pub id: i64,
    pub shard_id: i64,
    pub host: String,
    pub port: i64,
}

/// One (project, exporter, host) scrape target with its labels.
#[derive(Debug, Clone, FromRow)]
pub struct ExporterTargetRow {
    pub shard: String,
    pub service: String,
    pub project: String,
    pub farm: String,
    pub farm_source: String,
    pub job: String,
    pub port: i64,
    pub path: String,
    pub scheme: String,
    pub host: String,
}

/// One blackbox probe URL with its labels.
#[derive(Debug, Clone, FromRow)]
pub struct ProbeUrlRow {
    pub shard: String,
    pub service: String,
    pub project: String,
    pub url: String,
    pub probe_module: String,
}
