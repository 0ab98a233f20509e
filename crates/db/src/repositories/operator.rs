use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use kendra_core::domain::center::CenterId;
use kendra_core::domain::operator::{Operator, OperatorId};

use super::{flag, OperatorRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOperatorRepository {
    pool: DbPool,
}

impl SqlOperatorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OperatorRepository for SqlOperatorRepository {
    async fn list(&self, active_only: bool) -> Result<Vec<Operator>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, code, center_id, post, active
             FROM operator
             WHERE (?1 = 0 OR active = 1)
             ORDER BY id",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(operator_from_row).collect()
    }
}

fn operator_from_row(row: &SqliteRow) -> Result<Operator, RepositoryError> {
    let center_id: Option<i64> = row.try_get("center_id")?;
    Ok(Operator {
        id: OperatorId(row.try_get("id")?),
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        center_id: center_id.map(CenterId),
        post: row.try_get("post")?,
        active: flag(row.try_get("active")?),
    })
}
