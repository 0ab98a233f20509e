use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const DEMO_CENTER_IDS: &[i64] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
const DEMO_SERVICE_IDS: &[i64] = &[1, 2, 3, 4, 5, 6, 7];
const DEMO_OPERATOR_IDS: &[i64] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
const DEMO_PROVISION_IDS: &[i64] = &[
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
];

/// Centers with both coordinates present.
const DEMO_LOCATED_CENTERS: i64 = 9;
const DEMO_ACTIVE_CENTERS: i64 = 9;
const DEMO_TOTAL_VOLUME: i64 = 542;

/// Deterministic demo dataset: two district groups of centers, one center without
/// coordinates and one inactive center, with three months of provisions.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the dataset. Rows that already exist are left untouched, so loading twice is a
    /// no-op.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            centers: DEMO_CENTER_IDS.len(),
            services: DEMO_SERVICE_IDS.len(),
            operators: DEMO_OPERATOR_IDS.len(),
            provisions: DEMO_PROVISION_IDS.len(),
        })
    }

    /// Checks that every fixture row is present with the expected shape.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (label, table, ids) in [
            ("demo-centers", "center", DEMO_CENTER_IDS),
            ("demo-services", "service", DEMO_SERVICE_IDS),
            ("demo-operators", "operator", DEMO_OPERATOR_IDS),
            ("demo-provisions", "provision", DEMO_PROVISION_IDS),
        ] {
            let count: i64 = sqlx::query_scalar(&format!(
                "SELECT COUNT(1) FROM {table} WHERE id IN {}",
                sql_array_from_ids(ids)
            ))
            .fetch_one(pool)
            .await?;
            checks.push((label, count == ids.len() as i64));
        }

        let centers = sql_array_from_ids(DEMO_CENTER_IDS);
        let located: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM center
             WHERE id IN {centers} AND latitude IS NOT NULL AND longitude IS NOT NULL"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("demo-center-coordinates", located == DEMO_LOCATED_CENTERS));

        let active: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM center WHERE id IN {centers} AND active = 1"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("demo-active-centers", active == DEMO_ACTIVE_CENTERS));

        let volume: i64 = sqlx::query_scalar(&format!(
            "SELECT IFNULL(SUM(volume), 0) FROM provision WHERE id IN {}",
            sql_array_from_ids(DEMO_PROVISION_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("demo-provision-volume", volume == DEMO_TOTAL_VOLUME));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes fixture rows, children first.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let services = sql_array_from_ids(DEMO_SERVICE_IDS);
        sqlx::query(&format!(
            "DELETE FROM provision WHERE id IN {}",
            sql_array_from_ids(DEMO_PROVISION_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM service_embedding WHERE service_id IN {services}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM operator WHERE id IN {}",
            sql_array_from_ids(DEMO_OPERATOR_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM service WHERE id IN {services}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM center WHERE id IN {}",
            sql_array_from_ids(DEMO_CENTER_IDS)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[i64]) -> String {
    let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    format!("({joined})")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SeedResult {
    pub centers: usize,
    pub services: usize,
    pub operators: usize,
    pub provisions: usize,
}

#[derive(Debug, serde::Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
