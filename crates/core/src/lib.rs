pub mod cache;
pub mod clustering;
pub mod config;
pub mod data;
pub mod domain;
pub mod errors;
pub mod recommend;
pub mod scoring;
pub mod service;
pub mod similarity;

pub use clustering::{Cluster, ClusterId, Clustering, ClusteringParams, GeoClusterer};
pub use data::{load_snapshot, CenterFilter, DataSnapshot, DataSource, SnapshotFilter};
pub use domain::center::{Center, CenterId, GeoPoint};
pub use domain::operator::{Operator, OperatorId};
pub use domain::provision::{DateRange, Provision};
pub use domain::service::{Service, ServiceId, ServiceType};
pub use errors::{AnalyticsError, InterfaceError};
pub use recommend::{
    CenterRecommendation, CenterTrainingPlan, EvidenceRecord, ReasonFormatter,
    RecommendationList, RecommendationStatus, RecommenderSettings, ServiceToCenterRequest,
    SortOrder, TemplateReasonFormatter, TrainingNeed, TrainingPlanRequest, TrainingRequest,
    UnderperformingCenter, UnderperformingRequest,
};
pub use scoring::{CenterScore, EfficiencyBasis, PerformanceScorer, ScoreBoard, ScoringWeights};
pub use service::{AnalyticsService, ClusterSummary, IndexBuildReport};
pub use similarity::{EmbeddingProvider, HashingEmbedder, HttpEmbeddingProvider, SimilarityIndex};
