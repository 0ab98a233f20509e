use serde::{Deserialize, Serialize};

use super::{
    by_score_desc, AnalysisInputs, RecommendationList, RecommendationStatus,
    UnderperformingRequest,
};
use crate::clustering::ClusterId;
use crate::domain::center::CenterId;
use crate::errors::AnalyticsError;
use crate::scoring::CenterScore;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Weakest centers first.
    #[default]
    Asc,
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = AnalyticsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            other => Err(AnalyticsError::InvalidInput(format!(
                "unsupported sort order `{other}` (expected asc|desc)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnderperformingCenter {
    pub center_id: CenterId,
    pub center_name: String,
    pub district: String,
    pub score: f64,
    pub cluster_id: ClusterId,
    pub peers: Vec<CenterId>,
}

/// Clustered centers ranked by score. The district filter narrows the output only;
/// scores are always relative to the full cluster.
pub fn detect_underperforming(
    inputs: &AnalysisInputs<'_>,
    request: &UnderperformingRequest,
) -> Result<RecommendationList<UnderperformingCenter>, AnalyticsError> {
    request.validate()?;
    if inputs.clustering.is_empty() {
        return Ok(RecommendationList::empty(RecommendationStatus::NoClusters));
    }

    let district = request.district.as_deref().map(str::trim);
    let mut ranked: Vec<(&CenterScore, ClusterId)> = inputs
        .board
        .scores()
        .filter_map(|score| score.cluster.map(|cluster| (score, cluster)))
        .filter(|(score, _)| match district {
            Some(wanted) => inputs
                .snapshot
                .center(score.center_id)
                .map(|center| center.district.trim().eq_ignore_ascii_case(wanted))
                .unwrap_or(false),
            None => true,
        })
        .collect();

    ranked.sort_by(|(left, _), (right, _)| match request.sort_order {
        SortOrder::Desc => {
            by_score_desc((left.score, left.center_id), (right.score, right.center_id))
        }
        SortOrder::Asc => left
            .score
            .partial_cmp(&right.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| left.center_id.cmp(&right.center_id)),
    });
    ranked.truncate(request.num_centers);

    let items = ranked
        .into_iter()
        .map(|(score, cluster_id)| {
            let center = inputs.snapshot.center(score.center_id);
            UnderperformingCenter {
                center_id: score.center_id,
                center_name: center.map(|c| c.name.clone()).unwrap_or_default(),
                district: center.map(|c| c.district.clone()).unwrap_or_default(),
                score: score.score,
                cluster_id,
                peers: inputs.clustering.peers(score.center_id),
            }
        })
        .collect();

    Ok(RecommendationList::new(RecommendationStatus::Ok, items))
}
