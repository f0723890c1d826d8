//! Routable entities: services, projects and users.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::ServiceDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::domain::{EntityLookup, NamedEntity, OwnerKind, OwnerRef};

#[async_trait]
pub trait EntityRepository: EntityLookup {
    /// Get the service named `name`, creating it when missing.
    ///
    /// Keyed by the unique service name, so concurrent callers converge on
    /// one row. Returns the row and whether this call created it.
    async fn get_or_create_service(&self, name: &str) -> Result<(ServiceDbModel, bool)>;
    async fn get_service_by_name(&self, name: &str) -> Result<Option<ServiceDbModel>>;
    async fn count_services(&self) -> Result<i64>;
}

pub struct SqlxEntityRepository {
    pool: SqlitePool,
}

impl SqlxEntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityLookup for SqlxEntityRepository {
    async fn find_by_name(&self, kind: OwnerKind, name: &str) -> Result<Option<NamedEntity>> {
        let sql = match kind {
            OwnerKind::Project => "SELECT id, name FROM project WHERE name = ?",
            OwnerKind::Service => "SELECT id, name FROM service WHERE name = ?",
            OwnerKind::User => "SELECT id, username AS name FROM app_user WHERE username = ?",
            OwnerKind::Site => return Ok(None),
        };

        let row: Option<(i64, String)> = sqlx::query_as(sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(id, name)| NamedEntity {
            owner: OwnerRef::new(kind, id),
            name,
        }))
    }
}

#[async_trait]
impl EntityRepository for SqlxEntityRepository {
    async fn get_or_create_service(&self, name: &str) -> Result<(ServiceDbModel, bool)> {
        let pool = &self.pool;
        retry_on_sqlite_busy("get_or_create_service", || async move {
            let inserted = sqlx::query(
                "INSERT INTO service (name, description, created_at) VALUES (?, '', ?) ON CONFLICT(name) DO NOTHING",
            )
            .bind(name)
            .bind(now_ms())
            .execute(pool)
            .await?
            .rows_affected()
                > 0;

            let service =
                sqlx::query_as::<_, ServiceDbModel>("SELECT * FROM service WHERE name = ?")
                    .bind(name)
                    .fetch_one(pool)
                    .await?;
            Ok((service, inserted))
        })
        .await
    }

    async fn get_service_by_name(&self, name: &str) -> Result<Option<ServiceDbModel>> {
        let service = sqlx::query_as::<_, ServiceDbModel>("SELECT * FROM service WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(service)
    }

    async fn count_services(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM service")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
