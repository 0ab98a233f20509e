use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::center::{Center, CenterId};
use crate::domain::operator::Operator;
use crate::domain::provision::{DateRange, Provision};
use crate::domain::service::{Service, ServiceId};
use crate::errors::AnalyticsError;

/// Read-only access to the reference tables. Implementations return the full matching
/// row set; a store that cannot be reached fails with `DataUnavailable`.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn centers(&self, filter: &CenterFilter) -> Result<Vec<Center>, AnalyticsError>;
    async fn services(&self, active_only: bool) -> Result<Vec<Service>, AnalyticsError>;
    async fn operators(&self, active_only: bool) -> Result<Vec<Operator>, AnalyticsError>;
    async fn provisions(&self, range: Option<DateRange>)
        -> Result<Vec<Provision>, AnalyticsError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CenterFilter {
    pub district: Option<String>,
    pub active_only: bool,
}

impl CenterFilter {
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if let Some(district) = &self.district {
            if district.trim().is_empty() {
                return Err(AnalyticsError::InvalidInput(
                    "district filter must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn matches(&self, center: &Center) -> bool {
        if self.active_only && !center.active {
            return false;
        }
        match &self.district {
            Some(district) => center.district.trim().eq_ignore_ascii_case(district.trim()),
            None => true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotFilter {
    pub centers: CenterFilter,
    pub active_services_only: bool,
    pub active_operators_only: bool,
    pub date_range: Option<DateRange>,
}

/// All four tables as loaded for a single request.
#[derive(Clone, Debug)]
pub struct DataSnapshot {
    pub centers: Vec<Center>,
    pub services: Vec<Service>,
    pub operators: Vec<Operator>,
    pub provisions: Vec<Provision>,
    fingerprint: String,
}

impl DataSnapshot {
    pub fn new(
        mut centers: Vec<Center>,
        mut services: Vec<Service>,
        mut operators: Vec<Operator>,
        provisions: Vec<Provision>,
    ) -> Self {
        centers.sort_by_key(|center| center.id);
        services.sort_by_key(|service| service.id);
        operators.sort_by_key(|operator| operator.id);
        let fingerprint = fingerprint_centers(&centers);
        Self { centers, services, operators, provisions, fingerprint }
    }

    /// Hex digest over center ids, coordinates and activity flags.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn center(&self, id: CenterId) -> Option<&Center> {
        self.centers
            .binary_search_by_key(&id, |center| center.id)
            .ok()
            .map(|index| &self.centers[index])
    }

    pub fn service(&self, id: ServiceId) -> Option<&Service> {
        self.services
            .binary_search_by_key(&id, |service| service.id)
            .ok()
            .map(|index| &self.services[index])
    }

    /// Total volume per (center, service).
    pub fn volume_matrix(&self) -> BTreeMap<CenterId, BTreeMap<ServiceId, u64>> {
        let mut matrix: BTreeMap<CenterId, BTreeMap<ServiceId, u64>> = BTreeMap::new();
        for provision in &self.provisions {
            *matrix
                .entry(provision.center_id)
                .or_default()
                .entry(provision.service_id)
                .or_insert(0) += u64::from(provision.volume);
        }
        matrix
    }

    /// System-wide total volume per service.
    pub fn service_volumes(&self) -> BTreeMap<ServiceId, u64> {
        let mut totals = BTreeMap::new();
        for provision in &self.provisions {
            *totals.entry(provision.service_id).or_insert(0) += u64::from(provision.volume);
        }
        totals
    }

    pub fn active_days(&self) -> BTreeMap<CenterId, usize> {
        let mut days: BTreeMap<CenterId, BTreeSet<chrono::NaiveDate>> = BTreeMap::new();
        for provision in &self.provisions {
            if let Some(date) = provision.date {
                days.entry(provision.center_id).or_default().insert(date);
            }
        }
        days.into_iter().map(|(id, dates)| (id, dates.len())).collect()
    }

    pub fn active_operator_counts(&self) -> BTreeMap<CenterId, usize> {
        let mut counts = BTreeMap::new();
        for operator in self.operators.iter().filter(|operator| operator.active) {
            if let Some(center_id) = operator.center_id {
                *counts.entry(center_id).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn operators_for(&self, center_id: CenterId) -> Vec<&Operator> {
        self.operators
            .iter()
            .filter(|operator| operator.active && operator.center_id == Some(center_id))
            .collect()
    }
}

/// Loads every table for one request. A store with no matching centers is reported as
/// `DataUnavailable`, since nothing downstream can run without them.
pub async fn load_snapshot(
    source: &dyn DataSource,
    filter: &SnapshotFilter,
) -> Result<DataSnapshot, AnalyticsError> {
    filter.centers.validate()?;

    let centers = source.centers(&filter.centers).await?;
    if centers.is_empty() {
        return Err(AnalyticsError::DataUnavailable("no centers matched the filter".to_string()));
    }
    let services = source.services(filter.active_services_only).await?;
    let operators = source.operators(filter.active_operators_only).await?;
    let provisions = source.provisions(filter.date_range).await?;

    debug!(
        event_name = "analytics.snapshot.loaded",
        centers = centers.len(),
        services = services.len(),
        operators = operators.len(),
        provisions = provisions.len(),
        "loaded data snapshot"
    );

    Ok(DataSnapshot::new(centers, services, operators, provisions))
}

fn fingerprint_centers(centers: &[Center]) -> String {
    let mut hasher = blake3::Hasher::new();
    for center in centers {
        hasher.update(&center.id.0.to_le_bytes());
        match center.location {
            Some(point) => {
                hasher.update(&[1]);
                hasher.update(&point.latitude.to_bits().to_le_bytes());
                hasher.update(&point.longitude.to_bits().to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(&[u8::from(center.active)]);
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::{CenterFilter, DataSnapshot};
    use crate::domain::center::{Center, CenterId, GeoPoint};
    use crate::domain::provision::Provision;
    use crate::domain::service::ServiceId;

    fn center(id: i64, lat: f64, active: bool) -> Center {
        Center {
            id: CenterId(id),
            name: format!("Center {id}"),
            code: format!("C{id}"),
            center_type: "rural".to_string(),
            district: "Hooghly".to_string(),
            block: String::new(),
            location: GeoPoint::new(lat, 88.0),
            declared_operators: 1,
            active,
        }
    }

    #[test]
    fn fingerprint_is_order_independent_and_tracks_activity() {
        let only_centers = |centers| DataSnapshot::new(centers, vec![], vec![], vec![]);
        let a = only_centers(vec![center(1, 22.0, true), center(2, 23.0, true)]);
        let b = only_centers(vec![center(2, 23.0, true), center(1, 22.0, true)]);
        let c = only_centers(vec![center(1, 22.0, true), center(2, 23.0, false)]);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn volume_matrix_sums_repeated_rows() {
        let provisions = vec![
            Provision { center_id: CenterId(1), service_id: ServiceId(7), volume: 3, date: None },
            Provision { center_id: CenterId(1), service_id: ServiceId(7), volume: 4, date: None },
            Provision { center_id: CenterId(2), service_id: ServiceId(7), volume: 1, date: None },
        ];
        let snapshot = DataSnapshot::new(vec![center(1, 22.0, true)], vec![], vec![], provisions);

        let matrix = snapshot.volume_matrix();
        assert_eq!(matrix[&CenterId(1)][&ServiceId(7)], 7);
        assert_eq!(snapshot.service_volumes()[&ServiceId(7)], 8);
    }

    #[test]
    fn empty_district_filter_is_rejected() {
        let filter = CenterFilter { district: Some("  ".to_string()), active_only: false };
        assert!(filter.validate().is_err());
    }

    #[test]
    fn district_filter_matches_case_insensitively() {
        let filter = CenterFilter { district: Some("hooghly".to_string()), active_only: true };
        assert!(filter.matches(&center(1, 22.0, true)));
        assert!(!filter.matches(&center(1, 22.0, false)));
    }
}
