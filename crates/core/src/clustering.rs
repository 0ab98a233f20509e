//! Geographic k-means over center coordinates.
//!
//! Seeding is k-means++ from a fixed-seed ChaCha stream, and the lowest-inertia partition
//! over `restarts` runs is kept. Labels are renumbered by first appearance over centers in
//! id order, so the same input always yields the same cluster ids.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::center::{Center, CenterId, GeoPoint};
use crate::errors::AnalyticsError;

#[derive(Clone, Debug, PartialEq)]
pub struct ClusteringParams {
    /// Requested K; `None` derives `floor(sqrt(eligible))`.
    pub cluster_count: Option<usize>,
    pub seed: u64,
    pub max_iterations: usize,
    /// Largest centroid shift (in degrees) still treated as converged.
    pub tolerance: f64,
    pub restarts: usize,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self { cluster_count: None, seed: 42, max_iterations: 300, tolerance: 1e-4, restarts: 10 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClusterId(pub usize);

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub centroid: GeoPoint,
    /// Sorted ascending.
    pub members: Vec<CenterId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Clustering {
    pub clusters: Vec<Cluster>,
    pub requested_k: usize,
    pub effective_k: usize,
    pub inertia: f64,
    pub iterations: usize,
    pub converged: bool,
    #[serde(skip)]
    assignments: BTreeMap<CenterId, ClusterId>,
}

impl Clustering {
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn cluster_of(&self, center_id: CenterId) -> Option<ClusterId> {
        self.assignments.get(&center_id).copied()
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(id.0)
    }

    pub fn cluster_for_center(&self, center_id: CenterId) -> Option<&Cluster> {
        self.cluster_of(center_id).and_then(|id| self.cluster(id))
    }

    /// Other members of the center's cluster.
    pub fn peers(&self, center_id: CenterId) -> Vec<CenterId> {
        self.cluster_for_center(center_id)
            .map(|cluster| {
                cluster.members.iter().copied().filter(|member| *member != center_id).collect()
            })
            .unwrap_or_default()
    }

    pub fn assignments(&self) -> &BTreeMap<CenterId, ClusterId> {
        &self.assignments
    }
}

#[derive(Clone, Debug, Default)]
pub struct GeoClusterer {
    params: ClusteringParams,
}

struct Partition {
    labels: Vec<usize>,
    centroids: Vec<GeoPoint>,
    inertia: f64,
    iterations: usize,
    converged: bool,
}

impl GeoClusterer {
    pub fn new(params: ClusteringParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClusteringParams {
        &self.params
    }

    /// Clusters every eligible center. No eligible centers yields an empty clustering;
    /// a requested K above the eligible count is reduced with a warning.
    pub fn cluster(
        &self,
        centers: &[Center],
        include_inactive: bool,
    ) -> Result<Clustering, AnalyticsError> {
        if self.params.cluster_count == Some(0) {
            return Err(AnalyticsError::InvalidInput(
                "cluster count must be greater than zero".to_string(),
            ));
        }

        let mut eligible: Vec<(CenterId, GeoPoint)> = centers
            .iter()
            .filter(|center| center.is_cluster_eligible(include_inactive))
            .filter_map(|center| center.location.map(|point| (center.id, point)))
            .collect();
        eligible.sort_by_key(|(id, _)| *id);
        eligible.dedup_by_key(|(id, _)| *id);

        if eligible.is_empty() {
            warn!(
                event_name = "analytics.clustering.no_eligible_centers",
                total_centers = centers.len(),
                "no centers with coordinates are eligible for clustering"
            );
            return Ok(Clustering::default());
        }

        let count = eligible.len();
        let requested_k = self.params.cluster_count.unwrap_or_else(|| default_k(count));
        let k = requested_k.min(count);
        if k < requested_k {
            warn!(
                event_name = "analytics.clustering.k_reduced",
                requested_k,
                effective_k = k,
                eligible_centers = count,
                "fewer eligible centers than requested clusters"
            );
        }

        let points: Vec<GeoPoint> = eligible.iter().map(|(_, point)| *point).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let mut best: Option<Partition> = None;
        for _ in 0..self.params.restarts.max(1) {
            let partition = self.run_lloyd(&points, k, &mut rng);
            let better =
                best.as_ref().map(|current| partition.inertia < current.inertia).unwrap_or(true);
            if better {
                best = Some(partition);
            }
        }

        let Some(best) = best else {
            return Ok(Clustering::default());
        };

        let clustering = relabel(&eligible, best, requested_k);
        debug!(
            event_name = "analytics.clustering.completed",
            eligible_centers = count,
            requested_k,
            effective_k = clustering.effective_k,
            inertia = clustering.inertia,
            iterations = clustering.iterations,
            converged = clustering.converged,
            "clustered centers"
        );
        Ok(clustering)
    }

    fn run_lloyd(&self, points: &[GeoPoint], k: usize, rng: &mut ChaCha8Rng) -> Partition {
        let mut centroids = kmeans_plus_plus(points, k, rng);
        let mut labels = assign(points, &centroids);
        let mut best = Partition {
            inertia: inertia(points, &centroids, &labels),
            labels: labels.clone(),
            centroids: centroids.clone(),
            iterations: 0,
            converged: false,
        };

        for iteration in 1..=self.params.max_iterations {
            let next = recompute_centroids(points, &labels, &centroids);
            let shift = centroids
                .iter()
                .zip(&next)
                .map(|(old, new)| old.squared_distance(new).sqrt())
                .fold(0.0f64, f64::max);
            centroids = next;
            labels = assign(points, &centroids);

            let current = inertia(points, &centroids, &labels);
            if current <= best.inertia {
                best.inertia = current;
                best.labels = labels.clone();
                best.centroids = centroids.clone();
            }
            best.iterations = iteration;

            if shift < self.params.tolerance {
                best.converged = true;
                break;
            }
        }

        best
    }
}

fn default_k(eligible: usize) -> usize {
    ((eligible as f64).sqrt().floor() as usize).max(1)
}

fn kmeans_plus_plus(points: &[GeoPoint], k: usize, rng: &mut ChaCha8Rng) -> Vec<GeoPoint> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    while centroids.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|point| {
                centroids
                    .iter()
                    .map(|centroid| point.squared_distance(centroid))
                    .fold(f64::MAX, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();

        let chosen = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            weights
                .iter()
                .position(|weight| {
                    cumulative += weight;
                    cumulative >= target && *weight > 0.0
                })
                .unwrap_or(points.len() - 1)
        } else {
            rng.gen_range(0..points.len())
        };
        centroids.push(points[chosen]);
    }

    centroids
}

fn nearest(point: &GeoPoint, centroids: &[GeoPoint]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::MAX;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = point.squared_distance(centroid);
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

fn assign(points: &[GeoPoint], centroids: &[GeoPoint]) -> Vec<usize> {
    points.iter().map(|point| nearest(point, centroids)).collect()
}

/// Empty clusters keep their previous centroid.
fn recompute_centroids(
    points: &[GeoPoint],
    labels: &[usize],
    previous: &[GeoPoint],
) -> Vec<GeoPoint> {
    let mut sums = vec![(0.0f64, 0.0f64, 0usize); previous.len()];
    for (point, label) in points.iter().zip(labels) {
        let entry = &mut sums[*label];
        entry.0 += point.latitude;
        entry.1 += point.longitude;
        entry.2 += 1;
    }

    sums.into_iter()
        .zip(previous)
        .map(|((lat, lon, count), old)| {
            if count == 0 {
                *old
            } else {
                GeoPoint { latitude: lat / count as f64, longitude: lon / count as f64 }
            }
        })
        .collect()
}

fn inertia(points: &[GeoPoint], centroids: &[GeoPoint], labels: &[usize]) -> f64 {
    points.iter().zip(labels).map(|(point, label)| point.squared_distance(&centroids[*label])).sum()
}

fn relabel(
    eligible: &[(CenterId, GeoPoint)],
    partition: Partition,
    requested_k: usize,
) -> Clustering {
    let mut mapping: BTreeMap<usize, usize> = BTreeMap::new();
    let mut members: Vec<Vec<(CenterId, GeoPoint)>> = Vec::new();
    for ((center_id, point), label) in eligible.iter().zip(&partition.labels) {
        let next = mapping.len();
        let new_label = *mapping.entry(*label).or_insert(next);
        if new_label == members.len() {
            members.push(Vec::new());
        }
        members[new_label].push((*center_id, *point));
    }

    let mut assignments = BTreeMap::new();
    let clusters: Vec<Cluster> = members
        .into_iter()
        .enumerate()
        .map(|(index, group)| {
            let count = group.len() as f64;
            let (lat, lon) = group.iter().fold((0.0, 0.0), |(lat, lon), (_, point)| {
                (lat + point.latitude, lon + point.longitude)
            });
            let id = ClusterId(index);
            for (center_id, _) in &group {
                assignments.insert(*center_id, id);
            }
            Cluster {
                id,
                centroid: GeoPoint { latitude: lat / count, longitude: lon / count },
                members: group.into_iter().map(|(center_id, _)| center_id).collect(),
            }
        })
        .collect();

    let final_centroids: Vec<GeoPoint> = clusters.iter().map(|cluster| cluster.centroid).collect();
    let final_labels: Vec<usize> =
        eligible.iter().map(|(center_id, _)| assignments[center_id].0).collect();
    let points: Vec<GeoPoint> = eligible.iter().map(|(_, point)| *point).collect();

    Clustering {
        effective_k: clusters.len(),
        inertia: inertia(&points, &final_centroids, &final_labels),
        clusters,
        requested_k,
        iterations: partition.iterations,
        converged: partition.converged,
        assignments,
    }
}
