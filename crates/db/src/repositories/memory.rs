use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use kendra_core::data::CenterFilter;
use kendra_core::domain::center::{Center, CenterId};
use kendra_core::domain::operator::{Operator, OperatorId};
use kendra_core::domain::provision::{DateRange, Provision};
use kendra_core::domain::service::{Service, ServiceId};
use kendra_core::similarity::SimilarityIndex;

use super::{
    CenterRepository, EmbeddingRepository, OperatorRepository, ProvisionRepository,
    RepositoryError, ServiceRepository, StoredEmbedding,
};

/// Fixed reference rows; later duplicates of an id replace earlier ones.
#[derive(Default)]
pub struct InMemoryCenterRepository {
    centers: BTreeMap<CenterId, Center>,
}

impl InMemoryCenterRepository {
    pub fn new(centers: impl IntoIterator<Item = Center>) -> Self {
        Self { centers: centers.into_iter().map(|center| (center.id, center)).collect() }
    }
}

#[async_trait::async_trait]
impl CenterRepository for InMemoryCenterRepository {
    async fn list(&self, filter: &CenterFilter) -> Result<Vec<Center>, RepositoryError> {
        Ok(self.centers.values().filter(|center| filter.matches(center)).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryServiceRepository {
    services: BTreeMap<ServiceId, Service>,
}

impl InMemoryServiceRepository {
    pub fn new(services: impl IntoIterator<Item = Service>) -> Self {
        Self { services: services.into_iter().map(|service| (service.id, service)).collect() }
    }
}

#[async_trait::async_trait]
impl ServiceRepository for InMemoryServiceRepository {
    async fn list(&self, active_only: bool) -> Result<Vec<Service>, RepositoryError> {
        Ok(self
            .services
            .values()
            .filter(|service| service.active || !active_only)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryOperatorRepository {
    operators: BTreeMap<OperatorId, Operator>,
}

impl InMemoryOperatorRepository {
    pub fn new(operators: impl IntoIterator<Item = Operator>) -> Self {
        Self {
            operators: operators.into_iter().map(|operator| (operator.id, operator)).collect(),
        }
    }
}

#[async_trait::async_trait]
impl OperatorRepository for InMemoryOperatorRepository {
    async fn list(&self, active_only: bool) -> Result<Vec<Operator>, RepositoryError> {
        Ok(self
            .operators
            .values()
            .filter(|operator| operator.active || !active_only)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryProvisionRepository {
    provisions: Vec<Provision>,
}

impl InMemoryProvisionRepository {
    pub fn new(provisions: impl IntoIterator<Item = Provision>) -> Self {
        Self { provisions: provisions.into_iter().collect() }
    }
}

#[async_trait::async_trait]
impl ProvisionRepository for InMemoryProvisionRepository {
    async fn list(&self, range: Option<DateRange>) -> Result<Vec<Provision>, RepositoryError> {
        Ok(self
            .provisions
            .iter()
            .filter(|provision| match range {
                Some(range) => provision.date.is_some_and(|date| range.contains(date)),
                None => true,
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryEmbeddingRepository {
    embeddings: RwLock<BTreeMap<(String, ServiceId), StoredEmbedding>>,
}

#[async_trait::async_trait]
impl EmbeddingRepository for InMemoryEmbeddingRepository {
    async fn load(&self, provider: &str) -> Result<Vec<StoredEmbedding>, RepositoryError> {
        let embeddings = self.embeddings.read().await;
        Ok(embeddings.values().filter(|stored| stored.provider == provider).cloned().collect())
    }

    async fn replace_all(
        &self,
        provider: &str,
        index: &SimilarityIndex,
    ) -> Result<usize, RepositoryError> {
        let updated_at = Utc::now();
        let mut embeddings = self.embeddings.write().await;
        embeddings.retain(|(stored_provider, _), _| stored_provider != provider);
        for (service_id, vector) in index.iter() {
            embeddings.insert(
                (provider.to_string(), service_id),
                StoredEmbedding {
                    service_id,
                    provider: provider.to_string(),
                    vector: vector.to_vec(),
                    updated_at,
                },
            );
        }
        Ok(index.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use kendra_core::data::CenterFilter;
    use kendra_core::domain::center::{Center, CenterId, GeoPoint};
    use kendra_core::domain::provision::{DateRange, Provision};
    use kendra_core::domain::service::ServiceId;
    use kendra_core::similarity::SimilarityIndex;

    use crate::repositories::{
        load_index, CenterRepository, EmbeddingRepository, InMemoryCenterRepository,
        InMemoryEmbeddingRepository, InMemoryProvisionRepository, ProvisionRepository,
    };

    fn center(id: i64, district: &str, active: bool) -> Center {
        Center {
            id: CenterId(id),
            name: format!("Center {id}"),
            code: format!("BSK-{id:03}"),
            center_type: "rural".to_string(),
            district: district.to_string(),
            block: String::new(),
            location: GeoPoint::new(22.0, 88.0),
            declared_operators: 1,
            active,
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).expect("valid date")
    }

    #[tokio::test]
    async fn center_repository_filters_and_orders_by_id() {
        let repo = InMemoryCenterRepository::new([
            center(3, "Nadia", true),
            center(1, "nadia", false),
            center(2, "Darjeeling", true),
        ]);

        let filter = CenterFilter { district: Some("NADIA".to_string()), active_only: false };
        let ids: Vec<i64> =
            repo.list(&filter).await.expect("list").iter().map(|center| center.id.0).collect();
        assert_eq!(ids, vec![1, 3]);

        let active = CenterFilter { district: None, active_only: true };
        assert_eq!(repo.list(&active).await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn provision_range_excludes_undated_rows() {
        let rows = [(1, Some(5)), (2, Some(20)), (3, None)].map(|(volume, day)| Provision {
            center_id: CenterId(1),
            service_id: ServiceId(1),
            volume,
            date: day.map(date),
        });
        let repo = InMemoryProvisionRepository::new(rows);

        let range = DateRange::new(date(1), date(10)).expect("range");
        let in_range = repo.list(Some(range)).await.expect("list");
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].volume, 1);
        assert_eq!(repo.list(None).await.expect("list").len(), 3);
    }

    #[tokio::test]
    async fn stored_vectors_reload_for_matching_provider_only() {
        let repo = InMemoryEmbeddingRepository::default();
        let mut index = SimilarityIndex::with_dimension(3);
        index.upsert(ServiceId(1), vec![1.0, 0.0, 0.0]).expect("upsert");
        index.upsert(ServiceId(2), vec![0.0, 1.0, 0.0]).expect("upsert");
        assert_eq!(repo.replace_all("hashing", &index).await.expect("persist"), 2);

        let reloaded = load_index(&repo, "hashing", 3).await.expect("reload");
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.vector(ServiceId(2)), Some(&[0.0, 1.0, 0.0][..]));

        assert!(load_index(&repo, "openai", 3).await.expect("reload").is_empty());
        assert!(load_index(&repo, "hashing", 8).await.expect("reload").is_empty());

        let mut remote = SimilarityIndex::with_dimension(3);
        remote.upsert(ServiceId(3), vec![0.0, 0.0, 1.0]).expect("upsert");
        assert_eq!(repo.replace_all("openai", &remote).await.expect("persist"), 1);
        assert_eq!(load_index(&repo, "hashing", 3).await.expect("reload").len(), 2);
        assert_eq!(load_index(&repo, "openai", 3).await.expect("reload").len(), 1);
    }
}
