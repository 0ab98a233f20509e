use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{center::CenterId, service::ServiceId};
use crate::errors::AnalyticsError;

/// One or more deliveries of a service at a center on a given day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provision {
    pub center_id: CenterId,
    pub service_id: ServiceId,
    pub volume: u32,
    pub date: Option<NaiveDate>,
}

/// Inclusive date window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AnalyticsError> {
        if start > end {
            return Err(AnalyticsError::InvalidInput(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::DateRange;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).expect("valid date")
    }

    #[test]
    fn inverted_range_is_invalid_input() {
        assert!(DateRange::new(day(10), day(2)).is_err());
    }

    #[test]
    fn range_is_inclusive() {
        let range = DateRange::new(day(1), day(5)).expect("range");
        assert!(range.contains(day(1)));
        assert!(range.contains(day(5)));
        assert!(!range.contains(day(6)));
    }
}
