use std::sync::Arc;

use chrono::NaiveDate;
use kendra_core::clustering::ClusteringParams;
use kendra_core::data::DataSource;
use kendra_core::domain::center::CenterId;
use kendra_core::domain::provision::DateRange;
use kendra_core::domain::service::{ServiceId, ServiceType};
use kendra_core::recommend::{
    RecommendationStatus, ServiceToCenterRequest, TrainingRequest, UnderperformingRequest,
};
use kendra_core::service::AnalyticsService;
use kendra_core::similarity::{HashingEmbedder, SimilarityIndex};
use kendra_db::repositories::{
    load_index, EmbeddingRepository, OperatorRepository, ServiceRepository,
    SqlEmbeddingRepository, SqlOperatorRepository, SqlServiceRepository,
};
use kendra_db::{connect_with_settings, migrations, DbPool, DemoDataset, RepositoryDataSource};

async fn seeded_pool(dir: &tempfile::TempDir) -> DbPool {
    let url = format!("sqlite://{}", dir.path().join("kendra.db").display());
    let pool = connect_with_settings(&url, 2, 5).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    DemoDataset::load(&pool).await.expect("seed");
    pool
}

fn analytics(pool: &DbPool) -> AnalyticsService {
    AnalyticsService::new(
        Arc::new(RepositoryDataSource::sql(pool.clone())),
        Arc::new(HashingEmbedder::new(64)),
    )
    .with_clustering(ClusteringParams { cluster_count: Some(2), ..ClusteringParams::default() })
}

fn day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, day).expect("valid date")
}

#[tokio::test]
async fn demo_districts_form_separate_clusters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = seeded_pool(&dir).await;

    let summary = analytics(&pool).cluster_summary(false).await.expect("summary");
    assert_eq!(summary.effective_k, 2);

    let mut groups: Vec<Vec<i64>> = summary
        .clusters
        .iter()
        .map(|cluster| {
            let mut ids: Vec<i64> = cluster.members.iter().map(|id| id.0).collect();
            ids.sort_unstable();
            ids
        })
        .collect();
    groups.sort();
    assert_eq!(groups, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
    assert_eq!(summary.unclustered, vec![CenterId(9), CenterId(10)]);
}

#[tokio::test]
async fn date_range_limits_provisions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = seeded_pool(&dir).await;
    let source = RepositoryDataSource::sql(pool);

    let january = DateRange::new(day(1, 1), day(1, 31)).expect("range");
    assert_eq!(source.provisions(Some(january)).await.expect("january").len(), 10);
    assert_eq!(source.provisions(None).await.expect("all").len(), 26);
}

#[tokio::test]
async fn training_gaps_come_from_the_district_cluster() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = seeded_pool(&dir).await;

    let result = analytics(&pool)
        .recommend_training_for_center(&TrainingRequest::new(CenterId(3)))
        .await
        .expect("training needs");
    assert_eq!(result.status, RecommendationStatus::Ok);
    assert!(!result.items.is_empty());
    assert!(result.items.iter().all(|need| need.gap_magnitude > 0.0));
    assert!(result.items.windows(2).all(|pair| pair[0].priority_score >= pair[1].priority_score));
}

#[tokio::test]
async fn district_filter_applies_to_underperforming_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = seeded_pool(&dir).await;

    let mut request = UnderperformingRequest::new(10);
    request.district = Some("darjeeling".to_string());
    let result = analytics(&pool).detect_underperforming(&request).await.expect("ranking");

    assert_eq!(result.items.len(), 4);
    assert!(result.items.iter().all(|center| center.district == "Darjeeling"));
}

#[tokio::test]
async fn persisted_embeddings_reload_into_a_fresh_service() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = seeded_pool(&dir).await;

    let builder = analytics(&pool);
    let report = builder.build_index().await.expect("build index");
    assert_eq!(report.services_embedded, 7);

    let repository = SqlEmbeddingRepository::new(pool.clone());
    let index = builder.index().expect("index installed");
    assert_eq!(repository.replace_all(&report.provider, &index).await.expect("persist"), 7);

    let reloaded = load_index(&repository, &report.provider, 64).await.expect("reload");
    assert_eq!(reloaded.len(), 7);

    let fresh = analytics(&pool);
    fresh.install_index(reloaded);
    let request = ServiceToCenterRequest::new(
        "issue caste certificates to students",
        ServiceType::Certificate,
        3,
    );
    let result = fresh.recommend_centers_for_service(&request).await.expect("recommendations");
    assert_eq!(result.status, RecommendationStatus::Ok);
    assert!(!result.items.is_empty());
    assert!(result.items.windows(2).all(|pair| pair[0].score >= pair[1].score));
}

#[tokio::test]
async fn reference_listings_honour_activity_flags() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = seeded_pool(&dir).await;

    let services = SqlServiceRepository::new(pool.clone());
    assert_eq!(services.list(false).await.expect("services").len(), 7);
    let active: Vec<i64> =
        services.list(true).await.expect("services").iter().map(|service| service.id.0).collect();
    assert_eq!(active, vec![1, 2, 3, 4, 5, 6]);

    let operators = SqlOperatorRepository::new(pool.clone());
    let all = operators.list(false).await.expect("operators");
    assert_eq!(all.len(), 12);
    assert!(all.iter().any(|operator| operator.center_id.is_none()));
    assert_eq!(operators.list(true).await.expect("operators").len(), 11);
}

#[tokio::test]
async fn rebuilding_one_provider_keeps_other_providers_vectors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = seeded_pool(&dir).await;
    let repository = SqlEmbeddingRepository::new(pool.clone());

    let mut hashing = SimilarityIndex::with_dimension(2);
    hashing.upsert(ServiceId(1), vec![1.0, 0.0]).expect("upsert");
    hashing.upsert(ServiceId(2), vec![0.0, 1.0]).expect("upsert");
    assert_eq!(repository.replace_all("hashing", &hashing).await.expect("persist"), 2);

    let mut remote = SimilarityIndex::with_dimension(3);
    remote.upsert(ServiceId(1), vec![0.5, 0.5, 0.0]).expect("upsert");
    assert_eq!(repository.replace_all("openai", &remote).await.expect("persist"), 1);

    let mut rebuilt = SimilarityIndex::with_dimension(2);
    rebuilt.upsert(ServiceId(3), vec![1.0, 1.0]).expect("upsert");
    assert_eq!(repository.replace_all("hashing", &rebuilt).await.expect("persist"), 1);

    let hashing_rows = repository.load("hashing").await.expect("load");
    assert_eq!(hashing_rows.len(), 1);
    assert_eq!(hashing_rows[0].service_id, ServiceId(3));

    let remote_index = load_index(&repository, "openai", 3).await.expect("reload");
    assert_eq!(remote_index.vector(ServiceId(1)), Some(&[0.5, 0.5, 0.0][..]));
}
