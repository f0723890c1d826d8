//! Read-only access to the monitoring-target set.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{ExporterTargetRow, ProbeUrlRow, PrometheusServerDbModel};

#[async_trait]
pub trait TargetRepository: Send + Sync {
    /// One row per (enabled exporter, host of the project's farm).
    async fn list_exporter_targets(&self) -> Result<Vec<ExporterTargetRow>>;
    async fn list_probe_urls(&self) -> Result<Vec<ProbeUrlRow>>;
    /// Prometheus servers, optionally limited to one shard.
    async fn list_prometheus_servers(
        &self,
        shard: Option<&str>,
    ) -> Result<Vec<PrometheusServerDbModel>>;
}

pub struct SqlxTargetRepository {
    pool: SqlitePool,
}

impl SqlxTargetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetRepository for SqlxTargetRepository {
    async fn list_exporter_targets(&self) -> Result<Vec<ExporterTargetRow>> {
        let rows = sqlx::query_as::<_, ExporterTargetRow>(
            r#"
            SELECT sh.name AS shard, sv.name AS service, p.name AS project,
                   f.name AS farm, f.source AS farm_source,
                   e.job, e.port, e.path, e.scheme, h.name AS host
            FROM exporter e
            INNER JOIN project p ON p.id = e.project_id
            INNER JOIN service sv ON sv.id = p.service_id
            INNER JOIN shard sh ON sh.id = p.shard_id
            INNER JOIN farm f ON f.id = p.farm_id
            INNER JOIN host h ON h.farm_id = f.id
            WHERE e.enabled = 1
            ORDER BY p.name, e.job, e.port, e.path, h.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_probe_urls(&self) -> Result<Vec<ProbeUrlRow>> {
        let rows = sqlx::query_as::<_, ProbeUrlRow>(
            r#"
            SELECT sh.name AS shard, sv.name AS service, p.name AS project,
                   u.url, u.probe_module
            FROM probe_url u
            INNER JOIN project p ON p.id = u.project_id
            INNER JOIN service sv ON sv.id = p.service_id
            INNER JOIN shard sh ON sh.id = p.shard_id
            ORDER BY p.name, u.probe_module, u.url
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_prometheus_servers(
        &self,
        shard: Option<&str>,
    ) -> Result<Vec<PrometheusServerDbModel>> {
        let rows = sqlx::query_as::<_, PrometheusServerDbModel>(
            r#"
            SELECT ps.* FROM prometheus_server ps
            INNER JOIN shard sh ON sh.id = ps.shard_id
            WHERE sh.enabled = 1 AND (? IS NULL OR sh.name = ?)
            ORDER BY ps.host, ps.port
            "#,
        )
        .bind(shard)
        .bind(shard)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
