//! Gap analysis and ranking. Everything here is a pure function of the snapshot,
//! clustering, score board and index handed in by the caller.

pub mod evidence;
pub mod service_to_center;
pub mod training;
pub mod underperforming;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::clustering::Clustering;
use crate::data::DataSnapshot;
use crate::domain::center::CenterId;
use crate::domain::provision::DateRange;
use crate::domain::service::ServiceType;
use crate::errors::AnalyticsError;
use crate::scoring::ScoreBoard;

pub use evidence::{
    CenterReasonContext, EvidenceRecord, ReasonFormatter, TemplateReasonFormatter,
    TrainingReasonContext,
};
pub use service_to_center::{recommend_centers, CenterRecommendation, ServiceMatchInputs};
pub use training::{training_needs, training_plan, CenterTrainingPlan, TrainingNeed};
pub use underperforming::{detect_underperforming, SortOrder, UnderperformingCenter};

/// Upper bound on `k`, `num_centers` and plan limits.
pub const MAX_RESULTS: usize = 1000;

#[derive(Clone, Debug, PartialEq)]
pub struct RecommenderSettings {
    /// Neighbours fetched from the similarity index per request (default: 5)
    pub similar_services: usize,
    /// Similar services scoring below this are ignored (default: 0.05)
    pub min_similarity: f64,
    /// Weight for the best matching similarity (default: 0.7)
    pub similarity_weight: f64,
    /// Weight for the sigmoid of the cluster performance score (default: 0.3)
    pub performance_weight: f64,
    /// Added to a neighbour's similarity when its type matches the request (default: 0.05)
    pub type_match_bonus: f64,
    /// Cluster services considered for training gaps (default: 10)
    pub top_services_per_cluster: usize,
    /// When set, only services the center delivers fewer than this many times are gaps
    pub min_volume_threshold: Option<u64>,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            similar_services: 5,
            min_similarity: 0.05,
            similarity_weight: 0.7,
            performance_weight: 0.3,
            type_match_bonus: 0.05,
            top_services_per_cluster: 10,
            min_volume_threshold: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Ok,
    /// Similarity index was empty; ranked on performance alone.
    PerformanceOnly,
    /// Embedding provider failed; ranked on performance alone.
    ProviderUnavailable,
    NoSimilarServices,
    NoClusters,
    CenterNotClustered,
    NoGaps,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::PerformanceOnly => "performance_only",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::NoSimilarServices => "no_similar_services",
            Self::NoClusters => "no_clusters",
            Self::CenterNotClustered => "center_not_clustered",
            Self::NoGaps => "no_gaps",
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            Self::Ok => "ranked on similarity and cluster performance",
            Self::PerformanceOnly => {
                "similarity index is empty; ranked on cluster performance only"
            }
            Self::ProviderUnavailable => {
                "embedding provider unavailable; ranked on cluster performance only"
            }
            Self::NoSimilarServices => "no indexed service is similar enough to the request",
            Self::NoClusters => "no centers could be clustered",
            Self::CenterNotClustered => "center has no coordinates or is excluded from clustering",
            Self::NoGaps => "center meets or exceeds its cluster on every benchmark service",
        }
    }
}

/// Ordered result with a status explaining empty or degraded output.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendationList<T> {
    pub status: RecommendationStatus,
    pub items: Vec<T>,
}

impl<T> RecommendationList<T> {
    pub fn new(status: RecommendationStatus, items: Vec<T>) -> Self {
        Self { status, items }
    }

    pub fn empty(status: RecommendationStatus) -> Self {
        Self { status, items: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Everything the gap and ranking passes read.
#[derive(Clone, Copy)]
pub struct AnalysisInputs<'a> {
    pub snapshot: &'a DataSnapshot,
    pub clustering: &'a Clustering,
    pub board: &'a ScoreBoard,
    pub settings: &'a RecommenderSettings,
    pub formatter: &'a dyn ReasonFormatter,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServiceToCenterRequest {
    pub name: String,
    pub description: String,
    pub service_type: ServiceType,
    pub k: usize,
    pub include_inactive: bool,
    pub date_range: Option<DateRange>,
}

impl ServiceToCenterRequest {
    pub fn new(description: impl Into<String>, service_type: ServiceType, k: usize) -> Self {
        Self {
            name: String::new(),
            description: description.into(),
            service_type,
            k,
            include_inactive: false,
            date_range: None,
        }
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.description.trim().is_empty() {
            return Err(AnalyticsError::InvalidInput(
                "service description must not be empty".to_string(),
            ));
        }
        validate_bound("k", self.k)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingRequest {
    pub center_id: CenterId,
    pub min_priority: f64,
    pub limit: Option<usize>,
    pub date_range: Option<DateRange>,
}

impl TrainingRequest {
    pub fn new(center_id: CenterId) -> Self {
        Self { center_id, min_priority: 0.0, limit: None, date_range: None }
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if !self.min_priority.is_finite() || self.min_priority < 0.0 {
            return Err(AnalyticsError::InvalidInput(
                "min_priority must be a finite, non-negative number".to_string(),
            ));
        }
        match self.limit {
            Some(limit) => validate_bound("limit", limit),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnderperformingRequest {
    pub num_centers: usize,
    pub sort_order: SortOrder,
    pub district: Option<String>,
    pub date_range: Option<DateRange>,
}

impl UnderperformingRequest {
    pub fn new(num_centers: usize) -> Self {
        Self { num_centers, sort_order: SortOrder::Asc, district: None, date_range: None }
    }

    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if let Some(district) = &self.district {
            if district.trim().is_empty() {
                return Err(AnalyticsError::InvalidInput(
                    "district filter must not be empty".to_string(),
                ));
            }
        }
        validate_bound("num_centers", self.num_centers)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingPlanRequest {
    pub limit: Option<usize>,
    pub date_range: Option<DateRange>,
}

impl TrainingPlanRequest {
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        match self.limit {
            Some(limit) => validate_bound("limit", limit),
            None => Ok(()),
        }
    }
}

fn validate_bound(name: &str, value: usize) -> Result<(), AnalyticsError> {
    if (1..=MAX_RESULTS).contains(&value) {
        Ok(())
    } else {
        Err(AnalyticsError::InvalidInput(format!("{name} must be in range 1..={MAX_RESULTS}")))
    }
}

pub fn sigmoid(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

/// Descending by score, then ascending by id.
pub(crate) fn by_score_desc<I: Ord>(left: (f64, I), right: (f64, I)) -> Ordering {
    right.0.partial_cmp(&left.0).unwrap_or(Ordering::Equal).then_with(|| left.1.cmp(&right.1))
}
