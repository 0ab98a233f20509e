use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use kendra_core::data::CenterFilter;
use kendra_core::domain::center::{Center, CenterId, GeoPoint};

use super::{flag, non_negative_u32, CenterRepository, RepositoryError};
use crate::DbPool;

const CENTER_COLUMNS: &str = "id, name, code, center_type, district, block, latitude, longitude, \
                              declared_operators, active";

pub struct SqlCenterRepository {
    pool: DbPool,
}

impl SqlCenterRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CenterRepository for SqlCenterRepository {
    async fn list(&self, filter: &CenterFilter) -> Result<Vec<Center>, RepositoryError> {
        let district = filter.district.as_deref().map(str::trim);
        let rows = sqlx::query(&format!(
            "SELECT {CENTER_COLUMNS} FROM center
             WHERE (?1 IS NULL OR lower(trim(district)) = lower(?1))
               AND (?2 = 0 OR active = 1)
             ORDER BY id"
        ))
        .bind(district)
        .bind(filter.active_only)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(center_from_row).collect()
    }
}

fn center_from_row(row: &SqliteRow) -> Result<Center, RepositoryError> {
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    let location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude),
        _ => None,
    };

    Ok(Center {
        id: CenterId(row.try_get("id")?),
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        center_type: row.try_get("center_type")?,
        district: row.try_get("district")?,
        block: row.try_get("block")?,
        location,
        declared_operators: non_negative_u32(
            row.try_get("declared_operators")?,
            "center.declared_operators",
        )?,
        active: flag(row.try_get("active")?),
    })
}
