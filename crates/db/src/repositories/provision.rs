use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use kendra_core::domain::center::CenterId;
use kendra_core::domain::provision::{DateRange, Provision};
use kendra_core::domain::service::ServiceId;

use super::{non_negative_u32, ProvisionRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProvisionRepository {
    pool: DbPool,
}

impl SqlProvisionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProvisionRepository for SqlProvisionRepository {
    async fn list(&self, range: Option<DateRange>) -> Result<Vec<Provision>, RepositoryError> {
        let rows = match range {
            Some(range) => {
                sqlx::query(
                    "SELECT center_id, service_id, volume, provided_on
                     FROM provision
                     WHERE provided_on IS NOT NULL AND provided_on BETWEEN ?1 AND ?2
                     ORDER BY id",
                )
                .bind(range.start)
                .bind(range.end)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT center_id, service_id, volume, provided_on FROM provision ORDER BY id",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(provision_from_row).collect()
    }
}

fn provision_from_row(row: &SqliteRow) -> Result<Provision, RepositoryError> {
    let date: Option<NaiveDate> = row.try_get("provided_on")?;
    Ok(Provision {
        center_id: CenterId(row.try_get("center_id")?),
        service_id: ServiceId(row.try_get("service_id")?),
        volume: non_negative_u32(row.try_get("volume")?, "provision.volume")?,
        date,
    })
}
