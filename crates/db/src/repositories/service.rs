use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use kendra_core::domain::service::{Service, ServiceId, ServiceType};

use super::{flag, RepositoryError, ServiceRepository};
use crate::DbPool;

pub struct SqlServiceRepository {
    pool: DbPool,
}

impl SqlServiceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ServiceRepository for SqlServiceRepository {
    async fn list(&self, active_only: bool) -> Result<Vec<Service>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, service_type, department, description, active
             FROM service
             WHERE (?1 = 0 OR active = 1)
             ORDER BY id",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(service_from_row).collect()
    }
}

fn service_from_row(row: &SqliteRow) -> Result<Service, RepositoryError> {
    let service_type: String = row.try_get("service_type")?;
    Ok(Service {
        id: ServiceId(row.try_get("id")?),
        name: row.try_get("name")?,
        service_type: ServiceType::from_label(&service_type),
        department: row.try_get("department")?,
        description: row.try_get("description")?,
        active: flag(row.try_get("active")?),
    })
}
