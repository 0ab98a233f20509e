use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use kendra_core::data::CenterFilter;
use kendra_core::domain::center::Center;
use kendra_core::domain::operator::Operator;
use kendra_core::domain::provision::{DateRange, Provision};
use kendra_core::domain::service::{Service, ServiceId};
use kendra_core::errors::AnalyticsError;
use kendra_core::similarity::SimilarityIndex;

pub mod center;
pub mod embedding;
pub mod memory;
pub mod operator;
pub mod provision;
pub mod service;

pub use center::SqlCenterRepository;
pub use embedding::{load_index, SqlEmbeddingRepository};
pub use memory::{
    InMemoryCenterRepository, InMemoryEmbeddingRepository, InMemoryOperatorRepository,
    InMemoryProvisionRepository, InMemoryServiceRepository,
};
pub use operator::SqlOperatorRepository;
pub use provision::SqlProvisionRepository;
pub use service::SqlServiceRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for AnalyticsError {
    fn from(error: RepositoryError) -> Self {
        AnalyticsError::DataUnavailable(error.to_string())
    }
}

// Analytics only reads reference data; rows are written by migrations and fixtures.
#[async_trait]
pub trait CenterRepository: Send + Sync {
    /// Matching centers ordered by id.
    async fn list(&self, filter: &CenterFilter) -> Result<Vec<Center>, RepositoryError>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn list(&self, active_only: bool) -> Result<Vec<Service>, RepositoryError>;
}

#[async_trait]
pub trait OperatorRepository: Send + Sync {
    async fn list(&self, active_only: bool) -> Result<Vec<Operator>, RepositoryError>;
}

#[async_trait]
pub trait ProvisionRepository: Send + Sync {
    /// Rows inside `range` (inclusive). Undated rows are only returned without a range.
    async fn list(&self, range: Option<DateRange>) -> Result<Vec<Provision>, RepositoryError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredEmbedding {
    pub service_id: ServiceId,
    pub provider: String,
    pub vector: Vec<f32>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Stored vectors produced by `provider`, ordered by service id.
    async fn load(&self, provider: &str) -> Result<Vec<StoredEmbedding>, RepositoryError>;
    /// Replaces the vectors stored for `provider` with the contents of `index`, leaving
    /// other providers' rows alone. Returns the row count written.
    async fn replace_all(
        &self,
        provider: &str,
        index: &SimilarityIndex,
    ) -> Result<usize, RepositoryError>;
}

pub(crate) fn flag(value: i64) -> bool {
    value != 0
}

pub(crate) fn non_negative_u32(value: i64, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column} out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use kendra_core::errors::AnalyticsError;

    use super::{non_negative_u32, RepositoryError};

    #[test]
    fn repository_errors_surface_as_data_unavailable() {
        let error: AnalyticsError = RepositoryError::Decode("bad row".to_string()).into();
        assert!(matches!(
            error,
            AnalyticsError::DataUnavailable(message) if message.contains("bad row")
        ));
    }

    #[test]
    fn negative_counts_are_decode_errors() {
        assert_eq!(non_negative_u32(3, "volume").expect("in range"), 3);
        assert!(matches!(non_negative_u32(-1, "volume"), Err(RepositoryError::Decode(_))));
    }
}
