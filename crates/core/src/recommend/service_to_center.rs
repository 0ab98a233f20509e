use serde::Serialize;

use super::evidence::{CenterReasonContext, EvidenceRecord, ReasonFormatter};
use super::{
    by_score_desc, sigmoid, RecommendationList, RecommendationStatus, RecommenderSettings,
    ServiceToCenterRequest,
};
use crate::clustering::{ClusterId, Clustering};
use crate::data::DataSnapshot;
use crate::domain::center::{Center, CenterId};
use crate::domain::service::ServiceId;
use crate::errors::AnalyticsError;
use crate::scoring::ScoreBoard;
use crate::similarity::SimilarityIndex;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CenterRecommendation {
    pub rank: usize,
    pub center_id: CenterId,
    pub center_name: String,
    pub district: String,
    pub cluster: Option<ClusterId>,
    pub score: f64,
    pub matched_service: Option<ServiceId>,
    pub reason: String,
    pub evidence: Vec<EvidenceRecord>,
}

pub struct ServiceMatchInputs<'a> {
    pub snapshot: &'a DataSnapshot,
    pub clustering: &'a Clustering,
    pub board: &'a ScoreBoard,
    pub index: &'a SimilarityIndex,
    /// Embedding of the candidate service; `None` when the provider failed.
    pub query: Option<&'a [f32]>,
    pub settings: &'a RecommenderSettings,
    pub formatter: &'a dyn ReasonFormatter,
}

struct Match {
    service_id: ServiceId,
    name: String,
    similarity: f64,
}

struct Candidate<'a> {
    center: &'a Center,
    score: f64,
    best: Option<&'a Match>,
    evidence: Vec<EvidenceRecord>,
}

/// Best centers to launch a new service at. Falls back to a performance-only ranking
/// when the index is empty or no query vector could be produced.
pub fn recommend_centers(
    inputs: &ServiceMatchInputs<'_>,
    request: &ServiceToCenterRequest,
) -> Result<RecommendationList<CenterRecommendation>, AnalyticsError> {
    request.validate()?;

    let eligible: Vec<&Center> = inputs
        .snapshot
        .centers
        .iter()
        .filter(|center| center.active || request.include_inactive)
        .collect();

    let query = match inputs.query {
        Some(query) if !inputs.index.is_empty() => query,
        Some(_) => {
            return Ok(performance_only(
                inputs,
                &eligible,
                request.k,
                RecommendationStatus::PerformanceOnly,
            ))
        }
        None => {
            return Ok(performance_only(
                inputs,
                &eligible,
                request.k,
                RecommendationStatus::ProviderUnavailable,
            ))
        }
    };

    let settings = inputs.settings;
    let matches: Vec<Match> = inputs
        .index
        .nearest(query, settings.similar_services)?
        .into_iter()
        .filter(|hit| hit.similarity >= settings.min_similarity)
        .filter_map(|hit| {
            let service = inputs.snapshot.service(hit.service_id)?;
            // The type bonus only reorders services that already cleared the threshold.
            let bonus = if service.service_type == request.service_type {
                settings.type_match_bonus
            } else {
                0.0
            };
            Some(Match {
                service_id: service.id,
                name: service.name.clone(),
                similarity: (hit.similarity + bonus).clamp(0.0, 1.0),
            })
        })
        .collect();

    if matches.is_empty() {
        return Ok(RecommendationList::empty(RecommendationStatus::NoSimilarServices));
    }

    let mut candidates: Vec<Candidate<'_>> = eligible
        .iter()
        .filter_map(|center| {
            let best = matches
                .iter()
                .filter(|item| inputs.board.center_volume(center.id, item.service_id) > 0)
                .fold(None::<&Match>, |best, item| match best {
                    Some(current)
                        if current.similarity > item.similarity
                            || (current.similarity == item.similarity
                                && current.service_id < item.service_id) =>
                    {
                        Some(current)
                    }
                    _ => Some(item),
                })?;

            let center_score = inputs.board.score(center.id);
            let performance = center_score.map(|score| score.score).unwrap_or(0.0);
            let relevance_part = settings.similarity_weight * best.similarity;
            let performance_part = settings.performance_weight * sigmoid(performance);

            let mut evidence = vec![
                EvidenceRecord::new("similarity", best.similarity, relevance_part),
                EvidenceRecord::new("performance", performance, performance_part),
            ];
            if let Some(score) = center_score {
                evidence.extend(EvidenceRecord::from_center_score(score));
            }

            Some(Candidate {
                center,
                score: (relevance_part + performance_part).clamp(0.0, 1.0),
                best: Some(best),
                evidence,
            })
        })
        .collect();

    if candidates.is_empty() {
        return Ok(RecommendationList::empty(RecommendationStatus::NoSimilarServices));
    }

    candidates.sort_by(|left, right| {
        by_score_desc((left.score, left.center.id), (right.score, right.center.id))
    });
    candidates.truncate(request.k);
    Ok(RecommendationList::new(RecommendationStatus::Ok, finish(inputs, candidates)))
}

fn performance_only(
    inputs: &ServiceMatchInputs<'_>,
    eligible: &[&Center],
    k: usize,
    status: RecommendationStatus,
) -> RecommendationList<CenterRecommendation> {
    if inputs.clustering.is_empty() {
        return RecommendationList::empty(RecommendationStatus::NoClusters);
    }

    let mut candidates: Vec<Candidate<'_>> = eligible
        .iter()
        .filter(|center| inputs.clustering.cluster_of(center.id).is_some())
        .map(|center| {
            let center_score = inputs.board.score(center.id);
            let performance = center_score.map(|score| score.score).unwrap_or(0.0);
            let score = sigmoid(performance);
            let mut evidence = vec![EvidenceRecord::new("performance", performance, score)];
            if let Some(center_score) = center_score {
                evidence.extend(EvidenceRecord::from_center_score(center_score));
            }
            Candidate { center, score, best: None, evidence }
        })
        .collect();

    candidates.sort_by(|left, right| {
        by_score_desc((left.score, left.center.id), (right.score, right.center.id))
    });
    candidates.truncate(k);
    RecommendationList::new(status, finish(inputs, candidates))
}

fn finish(
    inputs: &ServiceMatchInputs<'_>,
    candidates: Vec<Candidate<'_>>,
) -> Vec<CenterRecommendation> {
    candidates
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| {
            let rank = index + 1;
            let cluster = inputs.clustering.cluster_of(candidate.center.id);
            let performance =
                inputs.board.score(candidate.center.id).map(|score| score.score).unwrap_or(0.0);
            let reason = inputs.formatter.center_reason(&CenterReasonContext {
                rank,
                best_match: candidate.best.map(|best| (best.name.as_str(), best.similarity)),
                performance,
                clustered: cluster.is_some(),
            });

            CenterRecommendation {
                rank,
                center_id: candidate.center.id,
                center_name: candidate.center.name.clone(),
                district: candidate.center.district.clone(),
                cluster,
                score: candidate.score,
                matched_service: candidate.best.map(|best| best.service_id),
                reason,
                evidence: candidate.evidence,
            }
        })
        .collect()
}
