//! Cluster-relative performance scoring.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clustering::{ClusterId, Clustering};
use crate::data::DataSnapshot;
use crate::domain::center::CenterId;
use crate::domain::service::ServiceId;
use crate::errors::AnalyticsError;

const VARIANCE_EPSILON: f64 = 1e-12;

/// Weights for the composite score components
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    /// Weight for total transaction volume (default: 1/3)
    pub volume: f64,
    /// Weight for distinct services provided (default: 1/3)
    pub diversity: f64,
    /// Weight for volume per operator or per active day (default: 1/3)
    pub efficiency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { volume: 1.0 / 3.0, diversity: 1.0 / 3.0, efficiency: 1.0 / 3.0 }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            ("volume", self.volume),
            ("diversity", self.diversity),
            ("efficiency", self.efficiency),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(format!("{name}_weight must be a finite, non-negative number"));
            }
        }
        if self.volume + self.diversity + self.efficiency <= 0.0 {
            return Err("weights must not all be zero".to_string());
        }
        Ok(())
    }

    fn weight(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Volume => self.volume,
            Metric::Diversity => self.diversity,
            Metric::Efficiency => self.efficiency,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EfficiencyBasis {
    #[default]
    PerOperator,
    PerActiveDay,
}

impl std::str::FromStr for EfficiencyBasis {
    type Err = AnalyticsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_operator" | "operator" => Ok(Self::PerOperator),
            "per_active_day" | "per_day" | "day" => Ok(Self::PerActiveDay),
            other => Err(AnalyticsError::InvalidInput(format!(
                "unsupported efficiency basis `{other}` (expected per_operator|per_active_day)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoringSettings {
    pub weights: ScoringWeights,
    pub efficiency_basis: EfficiencyBasis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Volume,
    Diversity,
    Efficiency,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Volume, Metric::Diversity, Metric::Efficiency];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Volume => "volume",
            Self::Diversity => "diversity",
            Self::Efficiency => "efficiency",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CenterMetrics {
    pub volume: f64,
    pub diversity: f64,
    pub efficiency: f64,
}

impl CenterMetrics {
    fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Volume => self.volume,
            Metric::Diversity => self.diversity,
            Metric::Efficiency => self.efficiency,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MetricContribution {
    pub metric: Metric,
    pub value: f64,
    pub cluster_mean: f64,
    /// z-score, or `value/mean - 1` when the cluster has no variance.
    pub normalized: f64,
    pub contribution: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CenterScore {
    pub center_id: CenterId,
    pub cluster: Option<ClusterId>,
    pub score: f64,
    pub metrics: CenterMetrics,
    pub breakdown: Vec<MetricContribution>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterStats {
    pub cluster_id: ClusterId,
    pub member_count: usize,
    pub mean_volume: f64,
    pub mean_diversity: f64,
    pub mean_efficiency: f64,
    /// Service volume summed over members, divided by member count.
    pub service_means: BTreeMap<ServiceId, f64>,
    pub service_totals: BTreeMap<ServiceId, u64>,
}

impl ClusterStats {
    /// Services ranked by total cluster volume, ties by id.
    pub fn top_services(&self, limit: usize) -> Vec<ServiceId> {
        let mut ranked: Vec<(ServiceId, u64)> =
            self.service_totals.iter().map(|(id, total)| (*id, *total)).collect();
        ranked.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
        ranked.into_iter().take(limit).map(|(id, _)| id).collect()
    }
}

/// Scores, cluster benchmarks and service importance for one snapshot.
#[derive(Clone, Debug, Default)]
pub struct ScoreBoard {
    scores: BTreeMap<CenterId, CenterScore>,
    cluster_stats: BTreeMap<ClusterId, ClusterStats>,
    center_service_volumes: BTreeMap<CenterId, BTreeMap<ServiceId, u64>>,
    service_volumes: BTreeMap<ServiceId, u64>,
}

impl ScoreBoard {
    pub fn score(&self, center_id: CenterId) -> Option<&CenterScore> {
        self.scores.get(&center_id)
    }

    pub fn scores(&self) -> impl Iterator<Item = &CenterScore> {
        self.scores.values()
    }

    pub fn cluster_stats(&self, cluster_id: ClusterId) -> Option<&ClusterStats> {
        self.cluster_stats.get(&cluster_id)
    }

    pub fn all_cluster_stats(&self) -> impl Iterator<Item = &ClusterStats> {
        self.cluster_stats.values()
    }

    pub fn center_volume(&self, center_id: CenterId, service_id: ServiceId) -> u64 {
        self.center_service_volumes
            .get(&center_id)
            .and_then(|volumes| volumes.get(&service_id))
            .copied()
            .unwrap_or(0)
    }

    /// Centers with any recorded volume for the service.
    pub fn providers_of(&self, service_id: ServiceId) -> Vec<CenterId> {
        self.center_service_volumes
            .iter()
            .filter(|(_, volumes)| volumes.get(&service_id).copied().unwrap_or(0) > 0)
            .map(|(center_id, _)| *center_id)
            .collect()
    }

    pub fn service_volume(&self, service_id: ServiceId) -> u64 {
        self.service_volumes.get(&service_id).copied().unwrap_or(0)
    }

    /// System volume of the service relative to the busiest service, in `[0, 1]`.
    pub fn service_importance(&self, service_id: ServiceId) -> f64 {
        let max = self.service_volumes.values().copied().max().unwrap_or(0);
        if max == 0 {
            return 0.0;
        }
        self.service_volume(service_id) as f64 / max as f64
    }
}

#[derive(Clone, Debug, Default)]
pub struct PerformanceScorer {
    settings: ScoringSettings,
}

impl PerformanceScorer {
    pub fn new(settings: ScoringSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ScoringSettings {
        &self.settings
    }

    pub fn score(&self, snapshot: &DataSnapshot, clustering: &Clustering) -> ScoreBoard {
        let center_service_volumes = snapshot.volume_matrix();
        let service_volumes = snapshot.service_volumes();
        let operator_counts = snapshot.active_operator_counts();
        let active_days = snapshot.active_days();

        let metrics: BTreeMap<CenterId, CenterMetrics> = snapshot
            .centers
            .iter()
            .map(|center| {
                let volumes = center_service_volumes.get(&center.id);
                let volume = volumes.map(|v| v.values().sum::<u64>()).unwrap_or(0) as f64;
                let diversity =
                    volumes.map(|v| v.values().filter(|total| **total > 0).count()).unwrap_or(0)
                        as f64;
                let divisor = match self.settings.efficiency_basis {
                    EfficiencyBasis::PerOperator => {
                        let active = operator_counts.get(&center.id).copied().unwrap_or(0);
                        if active > 0 {
                            active
                        } else {
                            center.declared_operators as usize
                        }
                    }
                    EfficiencyBasis::PerActiveDay => {
                        active_days.get(&center.id).copied().unwrap_or(0)
                    }
                }
                .max(1) as f64;
                (center.id, CenterMetrics { volume, diversity, efficiency: volume / divisor })
            })
            .collect();

        let mut cluster_stats = BTreeMap::new();
        let mut scores = BTreeMap::new();

        for cluster in &clustering.clusters {
            let member_metrics: Vec<CenterMetrics> = cluster
                .members
                .iter()
                .map(|id| metrics.get(id).copied().unwrap_or_default())
                .collect();
            let count = member_metrics.len().max(1) as f64;
            let means = CenterMetrics {
                volume: member_metrics.iter().map(|m| m.volume).sum::<f64>() / count,
                diversity: member_metrics.iter().map(|m| m.diversity).sum::<f64>() / count,
                efficiency: member_metrics.iter().map(|m| m.efficiency).sum::<f64>() / count,
            };

            let mut service_totals: BTreeMap<ServiceId, u64> = BTreeMap::new();
            for member in &cluster.members {
                if let Some(volumes) = center_service_volumes.get(member) {
                    for (service_id, total) in volumes {
                        *service_totals.entry(*service_id).or_insert(0) += total;
                    }
                }
            }
            let service_means =
                service_totals.iter().map(|(id, total)| (*id, *total as f64 / count)).collect();

            cluster_stats.insert(
                cluster.id,
                ClusterStats {
                    cluster_id: cluster.id,
                    member_count: cluster.members.len(),
                    mean_volume: means.volume,
                    mean_diversity: means.diversity,
                    mean_efficiency: means.efficiency,
                    service_means,
                    service_totals,
                },
            );

            let std_devs: BTreeMap<Metric, f64> = Metric::ALL
                .iter()
                .map(|metric| {
                    let mean = means.get(*metric);
                    let variance = member_metrics
                        .iter()
                        .map(|m| (m.get(*metric) - mean).powi(2))
                        .sum::<f64>()
                        / count;
                    (*metric, variance.sqrt())
                })
                .collect();

            for (center_id, center_metrics) in cluster.members.iter().zip(&member_metrics) {
                let singleton = cluster.members.len() < 2;
                let breakdown: Vec<MetricContribution> = Metric::ALL
                    .iter()
                    .map(|metric| {
                        let value = center_metrics.get(*metric);
                        let mean = means.get(*metric);
                        let normalized = if singleton {
                            0.0
                        } else {
                            normalize(value, mean, std_devs[metric])
                        };
                        MetricContribution {
                            metric: *metric,
                            value,
                            cluster_mean: mean,
                            normalized,
                            contribution: normalized * self.settings.weights.weight(*metric),
                        }
                    })
                    .collect();
                let score = breakdown.iter().map(|item| item.contribution).sum();

                scores.insert(
                    *center_id,
                    CenterScore {
                        center_id: *center_id,
                        cluster: Some(cluster.id),
                        score,
                        metrics: *center_metrics,
                        breakdown,
                    },
                );
            }
        }

        for (center_id, center_metrics) in &metrics {
            scores.entry(*center_id).or_insert_with(|| CenterScore {
                center_id: *center_id,
                cluster: None,
                score: 0.0,
                metrics: *center_metrics,
                breakdown: Vec::new(),
            });
        }

        ScoreBoard { scores, cluster_stats, center_service_volumes, service_volumes }
    }
}

fn normalize(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev * std_dev > VARIANCE_EPSILON {
        (value - mean) / std_dev
    } else if mean == 0.0 {
        0.0
    } else {
        value / mean - 1.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{normalize, EfficiencyBasis, PerformanceScorer, ScoringSettings, ScoringWeights};
    use crate::clustering::{ClusteringParams, GeoClusterer};
    use crate::data::DataSnapshot;
    use crate::domain::center::{Center, CenterId, GeoPoint};
    use crate::domain::operator::{Operator, OperatorId};
    use crate::domain::provision::Provision;
    use crate::domain::service::ServiceId;

    fn center(id: i64, lat: f64, lon: f64) -> Center {
        Center {
            id: CenterId(id),
            name: format!("Center {id}"),
            code: format!("C{id}"),
            center_type: "rural".to_string(),
            district: "Malda".to_string(),
            block: String::new(),
            location: GeoPoint::new(lat, lon),
            declared_operators: 2,
            active: true,
        }
    }

    fn provision(center: i64, service: i64, volume: u32) -> Provision {
        Provision {
            center_id: CenterId(center),
            service_id: ServiceId(service),
            volume,
            date: None,
        }
    }

    fn scored(snapshot: &DataSnapshot, k: usize, settings: ScoringSettings) -> super::ScoreBoard {
        let clustering = GeoClusterer::new(ClusteringParams {
            cluster_count: Some(k),
            ..ClusteringParams::default()
        })
        .cluster(&snapshot.centers, false)
        .expect("clustering");
        PerformanceScorer::new(settings).score(snapshot, &clustering)
    }

    #[test]
    fn singleton_cluster_scores_zero_and_pair_is_relative() {
        let snapshot = DataSnapshot::new(
            vec![center(1, 0.0, 0.0), center(2, 0.0, 1.0), center(3, 10.0, 10.0)],
            vec![],
            vec![],
            vec![
                provision(1, 1, 50),
                provision(1, 2, 10),
                provision(2, 1, 5),
                provision(3, 1, 500),
            ],
        );
        let board = scored(&snapshot, 2, ScoringSettings::default());

        let outlier = board.score(CenterId(3)).expect("score");
        assert_eq!(outlier.score, 0.0);
        let strong = board.score(CenterId(1)).expect("score").score;
        let weak = board.score(CenterId(2)).expect("score").score;
        assert!(strong > 0.0);
        assert!(weak < 0.0);
        assert!((strong + weak).abs() < 1e-9);
    }

    #[test]
    fn unclustered_center_scores_zero_without_cluster() {
        let mut floating = center(2, 0.0, 0.0);
        floating.location = None;
        let snapshot = DataSnapshot::new(
            vec![center(1, 0.0, 0.0), floating],
            vec![],
            vec![],
            vec![provision(2, 1, 80)],
        );
        let board = scored(&snapshot, 1, ScoringSettings::default());
        let score = board.score(CenterId(2)).expect("score");
        assert_eq!(score.cluster, None);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.metrics.volume, 80.0);
    }

    #[test]
    fn zero_variance_uses_ratio_to_mean() {
        assert_eq!(normalize(5.0, 5.0, 0.0), 0.0);
        assert_eq!(normalize(3.0, 0.0, 0.0), 0.0);
        assert!((normalize(6.0, 4.0, 0.0) - 0.5).abs() < 1e-12);
        assert!((normalize(6.0, 4.0, 2.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn efficiency_prefers_active_operators_then_declared_count() {
        let operators = vec![Operator {
            id: OperatorId(1),
            name: "Rina".to_string(),
            code: "DEO-1".to_string(),
            center_id: Some(CenterId(1)),
            post: "DEO".to_string(),
            active: true,
        }];
        let snapshot = DataSnapshot::new(
            vec![center(1, 0.0, 0.0), center(2, 0.0, 0.5)],
            vec![],
            operators,
            vec![provision(1, 1, 40), provision(2, 1, 40)],
        );
        let board = scored(&snapshot, 1, ScoringSettings::default());
        assert_eq!(board.score(CenterId(1)).expect("score").metrics.efficiency, 40.0);
        assert_eq!(board.score(CenterId(2)).expect("score").metrics.efficiency, 20.0);
    }

    #[test]
    fn efficiency_per_active_day_counts_distinct_dates() {
        let dated = |service, day| Provision {
            center_id: CenterId(1),
            service_id: ServiceId(service),
            volume: 10,
            date: NaiveDate::from_ymd_opt(2024, 1, day),
        };
        let provisions = vec![dated(1, 1), dated(2, 1), dated(1, 2)];
        let snapshot = DataSnapshot::new(vec![center(1, 0.0, 0.0)], vec![], vec![], provisions);
        let settings = ScoringSettings {
            weights: ScoringWeights::default(),
            efficiency_basis: EfficiencyBasis::PerActiveDay,
        };
        let board = scored(&snapshot, 1, settings);
        assert_eq!(board.score(CenterId(1)).expect("score").metrics.efficiency, 15.0);
    }

    #[test]
    fn cluster_stats_and_importance_are_reported() {
        let snapshot = DataSnapshot::new(
            vec![center(1, 0.0, 0.0), center(2, 0.0, 0.5)],
            vec![],
            vec![],
            vec![provision(1, 1, 30), provision(2, 1, 10), provision(2, 2, 20)],
        );
        let board = scored(&snapshot, 1, ScoringSettings::default());
        let stats = board.all_cluster_stats().next().expect("stats");
        assert_eq!(stats.member_count, 2);
        assert_eq!(stats.service_means[&ServiceId(1)], 20.0);
        assert_eq!(stats.top_services(1), vec![ServiceId(1)]);
        assert_eq!(board.service_importance(ServiceId(1)), 1.0);
        assert_eq!(board.service_importance(ServiceId(2)), 0.5);
        assert_eq!(board.providers_of(ServiceId(2)), vec![CenterId(2)]);
    }

    #[test]
    fn weights_reject_negative_and_all_zero() {
        let negative = ScoringWeights { volume: -1.0, ..ScoringWeights::default() };
        assert!(negative.validate().is_err());
        let zero = ScoringWeights { volume: 0.0, diversity: 0.0, efficiency: 0.0 };
        assert!(zero.validate().is_err());
        assert!(ScoringWeights::default().validate().is_ok());
    }
}
