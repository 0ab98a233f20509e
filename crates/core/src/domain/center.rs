use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CenterId(pub i64);

impl std::fmt::Display for CenterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Returns `None` unless both components are finite.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        (latitude.is_finite() && longitude.is_finite()).then_some(Self { latitude, longitude })
    }

    pub fn squared_distance(&self, other: &GeoPoint) -> f64 {
        let dlat = self.latitude - other.latitude;
        let dlon = self.longitude - other.longitude;
        dlat * dlat + dlon * dlon
    }
}

/// A physical service-delivery location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Center {
    pub id: CenterId,
    pub name: String,
    pub code: String,
    pub center_type: String,
    pub district: String,
    pub block: String,
    pub location: Option<GeoPoint>,
    pub declared_operators: u32,
    pub active: bool,
}

impl Center {
    pub fn is_cluster_eligible(&self, include_inactive: bool) -> bool {
        self.location.is_some() && (self.active || include_inactive)
    }
}

#[cfg(test)]
mod tests {
    use super::{Center, CenterId, GeoPoint};

    fn center(location: Option<GeoPoint>, active: bool) -> Center {
        Center {
            id: CenterId(1),
            name: "Sadar BSK".to_string(),
            code: "BSK-001".to_string(),
            center_type: "urban".to_string(),
            district: "Nadia".to_string(),
            block: "Krishnanagar".to_string(),
            location,
            declared_operators: 2,
            active,
        }
    }

    #[test]
    fn geo_point_rejects_non_finite_components() {
        assert!(GeoPoint::new(f64::NAN, 88.1).is_none());
        assert!(GeoPoint::new(22.5, f64::INFINITY).is_none());
        assert!(GeoPoint::new(22.5, 88.1).is_some());
    }

    #[test]
    fn eligibility_requires_location_and_respects_activity() {
        let point = GeoPoint::new(22.5, 88.3);
        assert!(center(point, true).is_cluster_eligible(false));
        assert!(!center(point, false).is_cluster_eligible(false));
        assert!(center(point, false).is_cluster_eligible(true));
        assert!(!center(None, true).is_cluster_eligible(true));
    }
}
