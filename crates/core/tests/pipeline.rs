use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kendra_core::clustering::ClusteringParams;
use kendra_core::data::{CenterFilter, DataSource};
use kendra_core::domain::center::{Center, CenterId, GeoPoint};
use kendra_core::domain::operator::Operator;
use kendra_core::domain::provision::{DateRange, Provision};
use kendra_core::domain::service::{Service, ServiceId, ServiceType};
use kendra_core::errors::AnalyticsError;
use kendra_core::recommend::{
    CenterReasonContext, ReasonFormatter, RecommendationStatus, ServiceToCenterRequest,
    SortOrder, TrainingReasonContext, TrainingRequest, UnderperformingRequest,
};
use kendra_core::service::AnalyticsService;
use kendra_core::similarity::{EmbeddingProvider, HashingEmbedder, SimilarityIndex};

#[derive(Default)]
struct StaticSource {
    centers: Vec<Center>,
    services: Vec<Service>,
    provisions: Vec<Provision>,
    center_calls: AtomicUsize,
    offline: bool,
}

#[async_trait]
impl DataSource for StaticSource {
    async fn centers(&self, filter: &CenterFilter) -> Result<Vec<Center>, AnalyticsError> {
        self.center_calls.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(AnalyticsError::DataUnavailable("connection refused".to_string()));
        }
        Ok(self.centers.iter().filter(|center| filter.matches(center)).cloned().collect())
    }

    async fn services(&self, active_only: bool) -> Result<Vec<Service>, AnalyticsError> {
        Ok(self.services.iter().filter(|service| service.active || !active_only).cloned().collect())
    }

    async fn operators(&self, _active_only: bool) -> Result<Vec<Operator>, AnalyticsError> {
        Ok(Vec::new())
    }

    async fn provisions(&self, range: Option<DateRange>) -> Result<Vec<Provision>, AnalyticsError> {
        Ok(self
            .provisions
            .iter()
            .filter(|provision| match (range, provision.date) {
                (Some(range), Some(date)) => range.contains(date),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect())
    }
}

struct FailingProvider;

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    fn dimension(&self) -> usize {
        8
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, AnalyticsError> {
        Err(AnalyticsError::DependencyError {
            dependency: "embedding provider `failing`".to_string(),
            message: "503 Service Unavailable".to_string(),
        })
    }
}

struct TerseFormatter;

impl ReasonFormatter for TerseFormatter {
    fn center_reason(&self, context: &CenterReasonContext<'_>) -> String {
        format!("center #{}", context.rank)
    }

    fn training_reason(&self, context: &TrainingReasonContext<'_>) -> String {
        format!("train on {}", context.service_name)
    }
}

fn center(id: i64, lat: f64, lon: f64, district: &str) -> Center {
    Center {
        id: CenterId(id),
        name: format!("Center {id}"),
        code: format!("BSK-{id:03}"),
        center_type: "rural".to_string(),
        district: district.to_string(),
        block: String::new(),
        location: GeoPoint::new(lat, lon),
        declared_operators: 1,
        active: true,
    }
}

fn service(id: i64, name: &str, service_type: ServiceType, description: &str) -> Service {
    Service {
        id: ServiceId(id),
        name: name.to_string(),
        service_type,
        department: "Revenue".to_string(),
        description: description.to_string(),
        active: true,
    }
}

fn provision(center: i64, service: i64, volume: u32) -> Provision {
    Provision { center_id: CenterId(center), service_id: ServiceId(service), volume, date: None }
}

fn three_center_source() -> StaticSource {
    StaticSource {
        centers: vec![
            center(1, 0.0, 0.0, "Nadia"),
            center(2, 0.0, 1.0, "Nadia"),
            center(3, 10.0, 10.0, "Darjeeling"),
        ],
        services: vec![
            service(1, "Caste certificate", ServiceType::Certificate, "issue caste certificate"),
            service(
                2,
                "Old age pension",
                ServiceType::Scheme,
                "enrol senior citizens in pension scheme",
            ),
        ],
        provisions: vec![
            provision(1, 1, 40),
            provision(1, 2, 12),
            provision(2, 1, 8),
            provision(3, 2, 90),
        ],
        ..StaticSource::default()
    }
}

fn service_for(source: StaticSource, provider: Arc<dyn EmbeddingProvider>) -> AnalyticsService {
    AnalyticsService::new(Arc::new(source), provider)
        .with_clustering(ClusteringParams { cluster_count: Some(2), ..ClusteringParams::default() })
        .with_embed_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn isolated_center_scores_zero_and_pair_is_scored_against_each_other() {
    let analytics = service_for(three_center_source(), Arc::new(HashingEmbedder::new(64)));

    let mut request = UnderperformingRequest::new(10);
    request.sort_order = SortOrder::Desc;
    let result = analytics.detect_underperforming(&request).await.expect("ranking");

    let by_id = |id: i64| {
        result.items.iter().find(|item| item.center_id == CenterId(id)).expect("center present")
    };
    assert_eq!(by_id(3).score, 0.0);
    assert!(by_id(3).peers.is_empty());
    assert_eq!(by_id(1).cluster_id, by_id(2).cluster_id);
    assert_ne!(by_id(1).cluster_id, by_id(3).cluster_id);
    assert!(by_id(1).score > 0.0);
    assert!((by_id(1).score + by_id(2).score).abs() < 1e-9);
    assert_eq!(result.items[0].center_id, CenterId(1));
}

#[tokio::test]
async fn empty_index_ranks_on_performance_only() {
    let analytics = service_for(three_center_source(), Arc::new(HashingEmbedder::new(64)));

    let request = ServiceToCenterRequest::new("income certificate", ServiceType::Certificate, 3);
    let result = analytics.recommend_centers_for_service(&request).await.expect("recommendations");

    assert_eq!(result.status, RecommendationStatus::PerformanceOnly);
    assert_eq!(result.items.len(), 3);
    assert!(result.items.windows(2).all(|pair| pair[0].score >= pair[1].score));
}

#[tokio::test]
async fn built_index_ranks_providers_of_similar_services() {
    let analytics = service_for(three_center_source(), Arc::new(HashingEmbedder::new(128)));
    let report = analytics.build_index().await.expect("index build");
    assert_eq!(report.services_embedded, 2);
    assert_eq!(report.dimension, Some(128));

    let mut request =
        ServiceToCenterRequest::new("issue income certificate", ServiceType::Certificate, 2);
    request.name = "Income certificate".to_string();
    let result = analytics.recommend_centers_for_service(&request).await.expect("recommendations");

    assert_eq!(result.status, RecommendationStatus::Ok);
    assert_eq!(result.items[0].center_id, CenterId(1));
    assert_eq!(result.items[0].matched_service, Some(ServiceId(1)));
    assert!(result.items[0].reason.contains("similarity to 'Caste certificate'"));
}

#[tokio::test]
async fn provider_failure_falls_back_to_performance_ranking() {
    let analytics = service_for(three_center_source(), Arc::new(FailingProvider));
    let mut index = SimilarityIndex::with_dimension(8);
    index.upsert(ServiceId(1), vec![1.0; 8]).expect("upsert");
    analytics.install_index(index);

    let request = ServiceToCenterRequest::new("pension", ServiceType::Scheme, 5);
    let result = analytics.recommend_centers_for_service(&request).await.expect("fallback");
    assert_eq!(result.status, RecommendationStatus::ProviderUnavailable);
    assert!(!result.items.is_empty());
}

#[tokio::test]
async fn provider_failure_during_build_surfaces_and_keeps_old_index() {
    let analytics = service_for(three_center_source(), Arc::new(FailingProvider));
    let mut index = SimilarityIndex::with_dimension(8);
    index.upsert(ServiceId(1), vec![1.0; 8]).expect("upsert");
    analytics.install_index(index);

    let error = analytics.build_index().await.expect_err("build should fail");
    assert!(error.is_dependency_failure());
    assert_eq!(analytics.index().map(|index| index.len()), Some(1));
}

#[tokio::test]
async fn training_needs_point_at_cluster_gaps() {
    let analytics = service_for(three_center_source(), Arc::new(HashingEmbedder::new(64)));

    let result = analytics
        .recommend_training_for_center(&TrainingRequest::new(CenterId(2)))
        .await
        .expect("training needs");
    assert_eq!(result.status, RecommendationStatus::Ok);
    assert_eq!(result.items[0].service_id, ServiceId(1));
    assert!((result.items[0].gap_magnitude - 16.0).abs() < 1e-9);

    let isolated = analytics
        .recommend_training_for_center(&TrainingRequest::new(CenterId(3)))
        .await
        .expect("training needs");
    assert_eq!(isolated.status, RecommendationStatus::NoGaps);
}

#[tokio::test]
async fn unreachable_store_is_data_unavailable() {
    let source = StaticSource { offline: true, ..three_center_source() };
    let analytics = service_for(source, Arc::new(HashingEmbedder::new(64)));

    let error = analytics
        .detect_underperforming(&UnderperformingRequest::new(5))
        .await
        .expect_err("store is offline");
    assert!(matches!(error, AnalyticsError::DataUnavailable(_)));
}

#[tokio::test]
async fn empty_store_is_data_unavailable() {
    let analytics = service_for(StaticSource::default(), Arc::new(HashingEmbedder::new(64)));
    let error = analytics.cluster_summary(false).await.expect_err("no centers");
    assert!(matches!(error, AnalyticsError::DataUnavailable(_)));
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_loading() {
    let source = Arc::new(three_center_source());
    let analytics = AnalyticsService::new(source.clone(), Arc::new(HashingEmbedder::new(64)));

    let error = analytics
        .detect_underperforming(&UnderperformingRequest::new(0))
        .await
        .expect_err("num_centers out of range");
    assert!(matches!(error, AnalyticsError::InvalidInput(_)));

    let error = analytics
        .recommend_centers_for_service(&ServiceToCenterRequest::new("", ServiceType::General, 5))
        .await
        .expect_err("empty description");
    assert!(matches!(error, AnalyticsError::InvalidInput(_)));
    assert_eq!(source.center_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeated_requests_reuse_cached_clustering() {
    let analytics = service_for(three_center_source(), Arc::new(HashingEmbedder::new(64)));

    let first = analytics.cluster_summary(false).await.expect("summary");
    let second = analytics.cluster_summary(false).await.expect("summary");
    assert_eq!(first, second);
    assert_eq!(first.effective_k, 2);
    assert_eq!(analytics.clustering_cache().misses(), 1);
    assert_eq!(analytics.clustering_cache().hits(), 1);
}

#[tokio::test]
async fn k_above_eligible_count_is_reduced_not_an_error() {
    let analytics = AnalyticsService::new(
        Arc::new(three_center_source()),
        Arc::new(HashingEmbedder::new(64)),
    )
    .with_clustering(ClusteringParams { cluster_count: Some(7), ..ClusteringParams::default() });

    let summary = analytics.cluster_summary(false).await.expect("summary");
    assert_eq!(summary.requested_k, 7);
    assert_eq!(summary.effective_k, 3);
    assert!(summary.unclustered.is_empty());
}

#[tokio::test]
async fn swapping_formatter_changes_reasons_only() {
    let default = service_for(three_center_source(), Arc::new(HashingEmbedder::new(128)));
    let terse = service_for(three_center_source(), Arc::new(HashingEmbedder::new(128)))
        .with_formatter(Arc::new(TerseFormatter));
    default.build_index().await.expect("index build");
    terse.build_index().await.expect("index build");

    let mut request =
        ServiceToCenterRequest::new("issue income certificate", ServiceType::Certificate, 3);
    request.name = "Income certificate".to_string();
    let expected = default.recommend_centers_for_service(&request).await.expect("default");
    let actual = terse.recommend_centers_for_service(&request).await.expect("terse");

    assert_eq!(expected.status, actual.status);
    assert_eq!(expected.items.len(), actual.items.len());
    assert!(!actual.items.is_empty());
    for (left, right) in expected.items.iter().zip(&actual.items) {
        assert_eq!(left.center_id, right.center_id);
        assert_eq!(left.score, right.score);
        assert_eq!(left.evidence, right.evidence);
        assert_ne!(left.reason, right.reason);
        assert_eq!(right.reason, format!("center #{}", right.rank));
    }

    let request = TrainingRequest::new(CenterId(2));
    let expected = default.recommend_training_for_center(&request).await.expect("default");
    let actual = terse.recommend_training_for_center(&request).await.expect("terse");
    assert!(!actual.items.is_empty());
    for (left, right) in expected.items.iter().zip(&actual.items) {
        assert_eq!(left.service_id, right.service_id);
        assert_eq!(left.priority_score, right.priority_score);
        assert_ne!(left.reason, right.reason);
        assert_eq!(right.reason, format!("train on {}", right.service_name));
    }
}
