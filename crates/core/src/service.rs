//! Request-level orchestration: load a snapshot, cluster, score, then rank.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{ClusteringCache, ClusteringKey, SnapshotCell};
use crate::clustering::{ClusterId, Clustering, ClusteringParams, GeoClusterer};
use crate::config::AppConfig;
use crate::data::{load_snapshot, CenterFilter, DataSnapshot, DataSource, SnapshotFilter};
use crate::domain::center::{CenterId, GeoPoint};
use crate::domain::provision::DateRange;
use crate::domain::service::embedding_text;
use crate::errors::AnalyticsError;
use crate::recommend::{
    detect_underperforming, recommend_centers, training_needs, training_plan, AnalysisInputs,
    CenterRecommendation, CenterTrainingPlan, ReasonFormatter, RecommendationList,
    RecommenderSettings, ServiceMatchInputs, ServiceToCenterRequest, TemplateReasonFormatter,
    TrainingNeed, TrainingPlanRequest, TrainingRequest, UnderperformingCenter,
    UnderperformingRequest,
};
use crate::scoring::{PerformanceScorer, ScoreBoard, ScoringSettings};
use crate::similarity::{embed_with_timeout, EmbeddingProvider, SimilarityIndex};

const EMBED_BATCH_SIZE: usize = 64;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IndexBuildReport {
    pub services_embedded: usize,
    pub dimension: Option<usize>,
    pub provider: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterReport {
    pub cluster_id: ClusterId,
    pub member_count: usize,
    pub centroid: GeoPoint,
    pub mean_volume: f64,
    pub mean_diversity: f64,
    pub members: Vec<CenterId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub requested_k: usize,
    pub effective_k: usize,
    pub converged: bool,
    pub clusters: Vec<ClusterReport>,
    /// Centers without coordinates or excluded by the activity filter.
    pub unclustered: Vec<CenterId>,
}

struct Analysis {
    snapshot: DataSnapshot,
    clustering: Arc<Clustering>,
    board: ScoreBoard,
}

pub struct AnalyticsService {
    source: Arc<dyn DataSource>,
    provider: Arc<dyn EmbeddingProvider>,
    clusterer: GeoClusterer,
    scorer: PerformanceScorer,
    settings: RecommenderSettings,
    formatter: Arc<dyn ReasonFormatter>,
    embed_timeout: Duration,
    index: SnapshotCell<SimilarityIndex>,
    clustering_cache: ClusteringCache,
}

impl AnalyticsService {
    pub fn new(source: Arc<dyn DataSource>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            source,
            provider,
            clusterer: GeoClusterer::default(),
            scorer: PerformanceScorer::default(),
            settings: RecommenderSettings::default(),
            formatter: Arc::new(TemplateReasonFormatter),
            embed_timeout: Duration::from_secs(30),
            index: SnapshotCell::new(),
            clustering_cache: ClusteringCache::new(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        source: Arc<dyn DataSource>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self::new(source, provider)
            .with_clustering(config.clustering.clone())
            .with_scoring(config.scoring.clone())
            .with_recommender(config.recommender.clone())
            .with_embed_timeout(Duration::from_secs(config.embedding.timeout_secs))
    }

    pub fn with_clustering(mut self, params: ClusteringParams) -> Self {
        self.clusterer = GeoClusterer::new(params);
        self
    }

    pub fn with_scoring(mut self, settings: ScoringSettings) -> Self {
        self.scorer = PerformanceScorer::new(settings);
        self
    }

    pub fn with_recommender(mut self, settings: RecommenderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn ReasonFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn index(&self) -> Option<Arc<SimilarityIndex>> {
        self.index.load()
    }

    /// Replaces the live index, e.g. with vectors reloaded from storage.
    pub fn install_index(&self, index: SimilarityIndex) {
        self.index.store(index);
    }

    pub fn clustering_cache(&self) -> &ClusteringCache {
        &self.clustering_cache
    }

    /// Embeds every known service and swaps in the new index. In-flight queries keep
    /// the index they started with.
    pub async fn build_index(&self) -> Result<IndexBuildReport, AnalyticsError> {
        let services = self.source.services(false).await?;
        let mut index = SimilarityIndex::with_dimension(self.provider.dimension());

        for batch in services.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|service| service.embedding_text()).collect();
            let vectors =
                embed_with_timeout(self.provider.as_ref(), &texts, self.embed_timeout).await?;
            for (service, vector) in batch.iter().zip(vectors) {
                index.upsert(service.id, vector)?;
            }
        }

        let report = IndexBuildReport {
            services_embedded: index.len(),
            dimension: index.dimension(),
            provider: self.provider.name().to_string(),
        };
        self.index.store(index);

        info!(
            event_name = "analytics.index.built",
            services_embedded = report.services_embedded,
            provider = %report.provider,
            "similarity index rebuilt"
        );
        Ok(report)
    }

    pub async fn recommend_centers_for_service(
        &self,
        request: &ServiceToCenterRequest,
    ) -> Result<RecommendationList<CenterRecommendation>, AnalyticsError> {
        request.validate()?;
        let analysis = self.analyse(request.date_range, request.include_inactive).await?;
        let index = self.index.load().unwrap_or_default();

        let query = if index.is_empty() {
            None
        } else {
            let text = embedding_text(&request.name, request.service_type, &request.description);
            match embed_with_timeout(self.provider.as_ref(), &[text], self.embed_timeout).await {
                Ok(mut vectors) => vectors.pop(),
                Err(error) if error.is_dependency_failure() => {
                    warn!(
                        event_name = "analytics.recommend.provider_fallback",
                        error_class = error.class(),
                        error = %error,
                        "embedding failed; ranking on performance only"
                    );
                    None
                }
                Err(error) => return Err(error),
            }
        };

        // An empty index ranks on performance regardless of the query.
        let query: Option<&[f32]> = if index.is_empty() { Some(&[]) } else { query.as_deref() };

        let inputs = ServiceMatchInputs {
            snapshot: &analysis.snapshot,
            clustering: &analysis.clustering,
            board: &analysis.board,
            index: &index,
            query,
            settings: &self.settings,
            formatter: self.formatter.as_ref(),
        };
        let result = recommend_centers(&inputs, request)?;
        info!(
            event_name = "analytics.recommend.centers_ranked",
            status = result.status.as_str(),
            results = result.items.len(),
            "ranked centers for candidate service"
        );
        Ok(result)
    }

    pub async fn recommend_training_for_center(
        &self,
        request: &TrainingRequest,
    ) -> Result<RecommendationList<TrainingNeed>, AnalyticsError> {
        request.validate()?;
        let analysis = self.analyse(request.date_range, false).await?;
        let result = training_needs(&self.inputs(&analysis), request)?;
        info!(
            event_name = "analytics.recommend.training_ranked",
            center_id = request.center_id.0,
            status = result.status.as_str(),
            results = result.items.len(),
            "ranked training needs"
        );
        Ok(result)
    }

    pub async fn detect_underperforming(
        &self,
        request: &UnderperformingRequest,
    ) -> Result<RecommendationList<UnderperformingCenter>, AnalyticsError> {
        request.validate()?;
        let analysis = self.analyse(request.date_range, false).await?;
        detect_underperforming(&self.inputs(&analysis), request)
    }

    pub async fn training_plan(
        &self,
        request: &TrainingPlanRequest,
    ) -> Result<RecommendationList<CenterTrainingPlan>, AnalyticsError> {
        request.validate()?;
        let analysis = self.analyse(request.date_range, false).await?;
        training_plan(&self.inputs(&analysis), request)
    }

    pub async fn cluster_summary(
        &self,
        include_inactive: bool,
    ) -> Result<ClusterSummary, AnalyticsError> {
        let analysis = self.analyse(None, include_inactive).await?;
        let clustering = &analysis.clustering;

        let clusters = clustering
            .clusters
            .iter()
            .map(|cluster| {
                let stats = analysis.board.cluster_stats(cluster.id);
                ClusterReport {
                    cluster_id: cluster.id,
                    member_count: cluster.members.len(),
                    centroid: cluster.centroid,
                    mean_volume: stats.map(|s| s.mean_volume).unwrap_or(0.0),
                    mean_diversity: stats.map(|s| s.mean_diversity).unwrap_or(0.0),
                    members: cluster.members.clone(),
                }
            })
            .collect();
        let unclustered = analysis
            .snapshot
            .centers
            .iter()
            .filter(|center| clustering.cluster_of(center.id).is_none())
            .map(|center| center.id)
            .collect();

        Ok(ClusterSummary {
            requested_k: clustering.requested_k,
            effective_k: clustering.effective_k,
            converged: clustering.converged,
            clusters,
            unclustered,
        })
    }

    fn inputs<'a>(&'a self, analysis: &'a Analysis) -> AnalysisInputs<'a> {
        AnalysisInputs {
            snapshot: &analysis.snapshot,
            clustering: &analysis.clustering,
            board: &analysis.board,
            settings: &self.settings,
            formatter: self.formatter.as_ref(),
        }
    }

    async fn analyse(
        &self,
        date_range: Option<DateRange>,
        include_inactive: bool,
    ) -> Result<Analysis, AnalyticsError> {
        let filter = SnapshotFilter {
            centers: CenterFilter::default(),
            active_services_only: false,
            active_operators_only: true,
            date_range,
        };
        let snapshot = load_snapshot(self.source.as_ref(), &filter).await?;

        let params = self.clusterer.params();
        let key = ClusteringKey {
            fingerprint: snapshot.fingerprint().to_string(),
            include_inactive,
            cluster_count: params.cluster_count,
            seed: params.seed,
        };
        let clustering = self
            .clustering_cache
            .get_or_compute(key, || self.clusterer.cluster(&snapshot.centers, include_inactive))?;
        let board = self.scorer.score(&snapshot, &clustering);

        Ok(Analysis { snapshot, clustering, board })
    }
}
