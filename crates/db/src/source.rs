//! `DataSource` adapter over the repositories. Every repository failure reaches the core as
//! `DataUnavailable`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use kendra_core::data::{CenterFilter, DataSource};
use kendra_core::domain::center::Center;
use kendra_core::domain::operator::Operator;
use kendra_core::domain::provision::{DateRange, Provision};
use kendra_core::domain::service::Service;
use kendra_core::errors::AnalyticsError;

use crate::repositories::{
    CenterRepository, OperatorRepository, ProvisionRepository, RepositoryError,
    ServiceRepository, SqlCenterRepository, SqlOperatorRepository, SqlProvisionRepository,
    SqlServiceRepository,
};
use crate::DbPool;

#[derive(Clone)]
pub struct RepositoryDataSource {
    centers: Arc<dyn CenterRepository>,
    services: Arc<dyn ServiceRepository>,
    operators: Arc<dyn OperatorRepository>,
    provisions: Arc<dyn ProvisionRepository>,
}

impl RepositoryDataSource {
    pub fn new(
        centers: Arc<dyn CenterRepository>,
        services: Arc<dyn ServiceRepository>,
        operators: Arc<dyn OperatorRepository>,
        provisions: Arc<dyn ProvisionRepository>,
    ) -> Self {
        Self { centers, services, operators, provisions }
    }

    pub fn sql(pool: DbPool) -> Self {
        Self::new(
            Arc::new(SqlCenterRepository::new(pool.clone())),
            Arc::new(SqlServiceRepository::new(pool.clone())),
            Arc::new(SqlOperatorRepository::new(pool.clone())),
            Arc::new(SqlProvisionRepository::new(pool)),
        )
    }
}

fn unavailable(entity: &'static str, error: RepositoryError) -> AnalyticsError {
    warn!(
        event_name = "db.source.query_failed",
        entity,
        error = %error,
        "reference data query failed"
    );
    AnalyticsError::from(error)
}

#[async_trait]
impl DataSource for RepositoryDataSource {
    async fn centers(&self, filter: &CenterFilter) -> Result<Vec<Center>, AnalyticsError> {
        filter.validate()?;
        self.centers.list(filter).await.map_err(|error| unavailable("center", error))
    }

    async fn services(&self, active_only: bool) -> Result<Vec<Service>, AnalyticsError> {
        self.services.list(active_only).await.map_err(|error| unavailable("service", error))
    }

    async fn operators(&self, active_only: bool) -> Result<Vec<Operator>, AnalyticsError> {
        self.operators.list(active_only).await.map_err(|error| unavailable("operator", error))
    }

    async fn provisions(
        &self,
        range: Option<DateRange>,
    ) -> Result<Vec<Provision>, AnalyticsError> {
        self.provisions.list(range).await.map_err(|error| unavailable("provision", error))
    }
}
