use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{info, warn};

use kendra_core::domain::service::ServiceId;
use kendra_core::similarity::SimilarityIndex;

use super::{EmbeddingRepository, RepositoryError, StoredEmbedding};
use crate::DbPool;

pub struct SqlEmbeddingRepository {
    pool: DbPool,
}

impl SqlEmbeddingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EmbeddingRepository for SqlEmbeddingRepository {
    async fn load(&self, provider: &str) -> Result<Vec<StoredEmbedding>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT service_id, provider, dimension, vector_json, updated_at
             FROM service_embedding
             WHERE provider = ?1
             ORDER BY service_id",
        )
        .bind(provider)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(embedding_from_row).collect()
    }

    async fn replace_all(
        &self,
        provider: &str,
        index: &SimilarityIndex,
    ) -> Result<usize, RepositoryError> {
        let updated_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM service_embedding WHERE provider = ?1")
            .bind(provider)
            .execute(&mut *tx)
            .await?;
        for (service_id, vector) in index.iter() {
            let vector_json = serde_json::to_string(vector)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            sqlx::query(
                "INSERT INTO service_embedding
                     (service_id, provider, dimension, vector_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(service_id.0)
            .bind(provider)
            .bind(vector.len() as i64)
            .bind(vector_json)
            .bind(updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            event_name = "db.embedding.persisted",
            provider,
            vectors = index.len(),
            "persisted service embeddings"
        );
        Ok(index.len())
    }
}

/// Rebuilds an index from stored vectors. Rows whose dimension no longer matches the
/// configured provider are skipped.
pub async fn load_index(
    repository: &dyn EmbeddingRepository,
    provider: &str,
    dimension: usize,
) -> Result<SimilarityIndex, RepositoryError> {
    let mut index = SimilarityIndex::with_dimension(dimension);
    let mut skipped = 0usize;

    for stored in repository.load(provider).await? {
        if stored.vector.len() != dimension {
            skipped += 1;
            continue;
        }
        index
            .upsert(stored.service_id, stored.vector)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    }

    if skipped > 0 {
        warn!(
            event_name = "db.embedding.dimension_mismatch",
            provider,
            expected_dimension = dimension,
            skipped,
            "ignored stored embeddings with a stale dimension"
        );
    }
    Ok(index)
}

fn embedding_from_row(row: &SqliteRow) -> Result<StoredEmbedding, RepositoryError> {
    let service_id = ServiceId(row.try_get("service_id")?);
    let dimension: i64 = row.try_get("dimension")?;
    let vector_json: String = row.try_get("vector_json")?;
    let vector: Vec<f32> = serde_json::from_str(&vector_json).map_err(|error| {
        RepositoryError::Decode(format!("embedding for service {service_id}: {error}"))
    })?;
    if vector.len() as i64 != dimension {
        return Err(RepositoryError::Decode(format!(
            "embedding for service {service_id} has {} values, row declares {dimension}",
            vector.len()
        )));
    }
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(StoredEmbedding { service_id, provider: row.try_get("provider")?, vector, updated_at })
}
