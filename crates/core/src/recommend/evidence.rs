use serde::Serialize;

use crate::scoring::CenterScore;

/// One signal behind a recommendation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvidenceRecord {
    pub metric: String,
    pub value: f64,
    pub contribution: f64,
}

impl EvidenceRecord {
    pub fn new(metric: impl Into<String>, value: f64, contribution: f64) -> Self {
        Self { metric: metric.into(), value, contribution }
    }

    /// Per-metric cluster evidence, prefixed `cluster_`.
    pub fn from_center_score(score: &CenterScore) -> Vec<Self> {
        score
            .breakdown
            .iter()
            .map(|item| {
                let metric = format!("cluster_{}", item.metric.as_str());
                Self::new(metric, item.normalized, item.contribution)
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CenterReasonContext<'a> {
    pub rank: usize,
    /// Name and adjusted similarity of the closest matching service the center provides.
    pub best_match: Option<(&'a str, f64)>,
    pub performance: f64,
    pub clustered: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingReasonContext<'a> {
    pub service_name: &'a str,
    pub center_volume: u64,
    pub cluster_mean: f64,
    pub gap: f64,
    pub importance: f64,
}

/// Renders human-readable justifications from structured evidence.
pub trait ReasonFormatter: Send + Sync {
    fn center_reason(&self, context: &CenterReasonContext<'_>) -> String;
    fn training_reason(&self, context: &TrainingReasonContext<'_>) -> String;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateReasonFormatter;

impl TemplateReasonFormatter {
    fn similarity_label(similarity: f64) -> &'static str {
        if similarity >= 0.75 {
            "high"
        } else if similarity >= 0.4 {
            "moderate"
        } else {
            "low"
        }
    }

    fn performance_label(context: &CenterReasonContext<'_>) -> &'static str {
        if !context.clustered {
            "no cluster benchmark"
        } else if context.performance > 0.0 {
            "above-average cluster performance"
        } else if context.performance < 0.0 {
            "below-average cluster performance"
        } else {
            "average cluster performance"
        }
    }
}

impl ReasonFormatter for TemplateReasonFormatter {
    fn center_reason(&self, context: &CenterReasonContext<'_>) -> String {
        let performance = Self::performance_label(context);
        match context.best_match {
            Some((name, similarity)) => format!(
                "Ranked #{} due to {} similarity to '{}' ({:.2}) and {}",
                context.rank,
                Self::similarity_label(similarity),
                name,
                similarity,
                performance
            ),
            None => format!(
                "Ranked #{} on cluster performance alone (score {:.2}, {})",
                context.rank, context.performance, performance
            ),
        }
    }

    fn training_reason(&self, context: &TrainingReasonContext<'_>) -> String {
        format!(
            "Cluster peers average {:.1} '{}' provisions against {} here \
             (gap {:.1}, importance {:.2})",
            context.cluster_mean,
            context.service_name,
            context.center_volume,
            context.gap,
            context.importance
        )
    }
}
