use std::cmp::Ordering;

use serde::Serialize;

use super::evidence::TrainingReasonContext;
use super::{
    AnalysisInputs, RecommendationList, RecommendationStatus, TrainingPlanRequest,
    TrainingRequest,
};
use crate::clustering::ClusterId;
use crate::domain::center::CenterId;
use crate::domain::operator::Operator;
use crate::domain::service::ServiceId;
use crate::errors::AnalyticsError;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingNeed {
    pub rank: usize,
    pub service_id: ServiceId,
    pub service_name: String,
    pub priority_score: f64,
    pub gap_magnitude: f64,
    pub center_volume: u64,
    pub cluster_mean: f64,
    pub importance: f64,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CenterTrainingPlan {
    pub center_id: CenterId,
    pub center_name: String,
    pub district: String,
    pub cluster: ClusterId,
    /// Sum of the gaps across all needs.
    pub priority: f64,
    pub operators: Vec<Operator>,
    pub needs: Vec<TrainingNeed>,
}

/// Services where the center trails its cluster's per-member mean, ranked by
/// `gap * (1 + importance)`.
pub fn training_needs(
    inputs: &AnalysisInputs<'_>,
    request: &TrainingRequest,
) -> Result<RecommendationList<TrainingNeed>, AnalyticsError> {
    request.validate()?;
    let AnalysisInputs { snapshot, clustering, board, settings, formatter } = *inputs;
    let center_id = request.center_id;
    let min_priority = request.min_priority;

    if snapshot.center(center_id).is_none() {
        return Err(AnalyticsError::InvalidInput(format!("unknown center id {center_id}")));
    }
    if clustering.is_empty() {
        return Ok(RecommendationList::empty(RecommendationStatus::NoClusters));
    }
    let Some(stats) = clustering.cluster_of(center_id).and_then(|id| board.cluster_stats(id)) else {
        return Ok(RecommendationList::empty(RecommendationStatus::CenterNotClustered));
    };

    let mut needs: Vec<TrainingNeed> = stats
        .top_services(settings.top_services_per_cluster)
        .into_iter()
        .filter_map(|service_id| {
            let center_volume = board.center_volume(center_id, service_id);
            if let Some(threshold) = settings.min_volume_threshold {
                if center_volume >= threshold {
                    return None;
                }
            }
            let cluster_mean = stats.service_means.get(&service_id).copied().unwrap_or(0.0);
            let gap = cluster_mean - center_volume as f64;
            if gap <= 0.0 {
                return None;
            }
            let importance = board.service_importance(service_id);
            let priority_score = gap * (1.0 + importance);
            if priority_score < min_priority {
                return None;
            }

            let service_name = snapshot
                .service(service_id)
                .map(|service| service.name.clone())
                .unwrap_or_else(|| format!("service {service_id}"));
            let reason = formatter.training_reason(&TrainingReasonContext {
                service_name: &service_name,
                center_volume,
                cluster_mean,
                gap,
                importance,
            });

            Some(TrainingNeed {
                rank: 0,
                service_id,
                service_name,
                priority_score,
                gap_magnitude: gap,
                center_volume,
                cluster_mean,
                importance,
                reason,
            })
        })
        .collect();

    if needs.is_empty() {
        return Ok(RecommendationList::empty(RecommendationStatus::NoGaps));
    }

    needs.sort_by(|left, right| {
        right
            .priority_score
            .partial_cmp(&left.priority_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                right.gap_magnitude.partial_cmp(&left.gap_magnitude).unwrap_or(Ordering::Equal)
            })
            .then_with(|| left.service_id.cmp(&right.service_id))
    });
    if let Some(limit) = request.limit {
        needs.truncate(limit);
    }
    for (index, need) in needs.iter_mut().enumerate() {
        need.rank = index + 1;
    }

    Ok(RecommendationList::new(RecommendationStatus::Ok, needs))
}

/// Training needs for every clustered center with at least one gap, busiest gaps first.
pub fn training_plan(
    inputs: &AnalysisInputs<'_>,
    request: &TrainingPlanRequest,
) -> Result<RecommendationList<CenterTrainingPlan>, AnalyticsError> {
    request.validate()?;
    let AnalysisInputs { snapshot, clustering, .. } = *inputs;
    if clustering.is_empty() {
        return Ok(RecommendationList::empty(RecommendationStatus::NoClusters));
    }

    let mut plans = Vec::new();
    for (center_id, cluster) in clustering.assignments() {
        let Some(center) = snapshot.center(*center_id) else {
            continue;
        };
        let needs = training_needs(inputs, &TrainingRequest::new(*center_id))?;
        if needs.is_empty() {
            continue;
        }

        plans.push(CenterTrainingPlan {
            center_id: *center_id,
            center_name: center.name.clone(),
            district: center.district.clone(),
            cluster: *cluster,
            priority: needs.items.iter().map(|need| need.gap_magnitude).sum(),
            operators: snapshot.operators_for(*center_id).into_iter().cloned().collect(),
            needs: needs.items,
        });
    }

    if plans.is_empty() {
        return Ok(RecommendationList::empty(RecommendationStatus::NoGaps));
    }

    plans.sort_by(|left, right| {
        right
            .priority
            .partial_cmp(&left.priority)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.center_id.cmp(&right.center_id))
    });
    if let Some(limit) = request.limit {
        plans.truncate(limit);
    }
    Ok(RecommendationList::new(RecommendationStatus::Ok, plans))
}
