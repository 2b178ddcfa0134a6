use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::constants::OVERLAP_COORD_DECIMALS;
use crate::types::{CanonicalPermit, SourceSystem};

/// Inclusive range of issue dates scanned for cross-source collisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl OverlapWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }
}

/// Location/day key used to spot the same permit reported by both feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollisionKey {
    pub lat_key: i64,
    pub lon_key: i64,
    pub issue_day: NaiveDate,
}

/// Counts for one collision key
#[derive(Debug, Clone, Default)]
struct CollisionGroup {
    records: usize,
    sources: BTreeSet<SourceSystem>,
}

/// Diagnostic summary of cross-source overlap; never feeds back into the data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapReport {
    pub window: OverlapWindow,
    /// Rows whose issue date falls inside the window
    pub rows_in_window: usize,
    /// Distinct (lat, lon, day) keys among rows that have all three
    pub groups: usize,
    /// Keys reported by more than one source system
    pub cross_system_collisions: usize,
    /// Rows that sit inside a cross-system key
    pub records_in_collisions: usize,
}

/// Scale a coordinate to an integer key at the comparison precision (ties to even)
pub fn coordinate_key(value: f64) -> i64 {
    let scale = 10f64.powi(OVERLAP_COORD_DECIMALS);
    (value * scale).round_ties_even() as i64
}

pub fn collision_key(permit: &CanonicalPermit) -> Option<CollisionKey> {
    let (lat, lon) = permit.coordinates()?;
    let issue_day = permit.issued_date?;
    Some(CollisionKey {
        lat_key: coordinate_key(lat),
        lon_key: coordinate_key(lon),
        issue_day,
    })
}

/// Count (rounded location, issue day) combinations reported by more than one feed
pub fn detect_overlap(permits: &[CanonicalPermit], window: OverlapWindow) -> OverlapReport {
    let mut groups: HashMap<CollisionKey, CollisionGroup> = HashMap::new();
    let mut rows_in_window = 0usize;

    for permit in permits {
        let Some(issued) = permit.issued_date else {
            continue;
        };
        if !window.contains(issued) {
            continue;
        }
        rows_in_window += 1;

        if let Some(key) = collision_key(permit) {
            let group = groups.entry(key).or_default();
            group.records += 1;
            group.sources.insert(permit.source_system);
        }
    }

    let mut cross_system_collisions = 0usize;
    let mut records_in_collisions = 0usize;
    for group in groups.values().filter(|g| g.sources.len() > 1) {
        cross_system_collisions += 1;
        records_in_collisions += group.records;
    }

    OverlapReport {
        window,
        rows_in_window,
        groups: groups.len(),
        cross_system_collisions,
        records_in_collisions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> OverlapWindow {
        OverlapWindow {
            start: NaiveDate::from_ymd_opt(2016, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
        }
    }

    fn permit(
        source: SourceSystem,
        lat: f64,
        lon: f64,
        issued: (i32, u32, u32),
    ) -> CanonicalPermit {
        let mut p = CanonicalPermit::empty(source);
        p.latitude = Some(lat);
        p.longitude = Some(lon);
        p.issued_date = NaiveDate::from_ymd_opt(issued.0, issued.1, issued.2);
        p
    }

    #[test]
    fn test_cross_source_collision_within_tolerance() {
        let permits = vec![
            permit(SourceSystem::DobHistorical, 40.712_341, -74.006_012, (2018, 5, 1)),
            permit(SourceSystem::DobNow, 40.712_338, -74.006_009, (2018, 5, 1)),
            // Same source twice is not a cross-system collision
            permit(SourceSystem::DobNow, 40.8, -73.9, (2018, 5, 2)),
            permit(SourceSystem::DobNow, 40.8, -73.9, (2018, 5, 2)),
        ];

        let report = detect_overlap(&permits, window());
        assert_eq!(report.rows_in_window, 4);
        assert_eq!(report.groups, 2);
        assert_eq!(report.cross_system_collisions, 1);
        assert_eq!(report.records_in_collisions, 2);
    }

    #[test]
    fn test_rows_outside_window_are_ignored() {
        let permits = vec![
            permit(SourceSystem::DobHistorical, 40.7, -74.0, (2015, 12, 31)),
            permit(SourceSystem::DobNow, 40.7, -74.0, (2015, 12, 31)),
            permit(SourceSystem::DobHistorical, 40.7, -74.0, (2019, 12, 31)),
            permit(SourceSystem::DobNow, 40.7, -74.0, (2019, 12, 31)),
        ];

        let report = detect_overlap(&permits, window());
        assert_eq!(report.rows_in_window, 2);
        assert_eq!(report.cross_system_collisions, 1);
    }

    #[test]
    fn test_different_days_do_not_collide() {
        let permits = vec![
            permit(SourceSystem::DobHistorical, 40.7, -74.0, (2017, 3, 1)),
            permit(SourceSystem::DobNow, 40.7, -74.0, (2017, 3, 2)),
        ];
        assert_eq!(detect_overlap(&permits, window()).cross_system_collisions, 0);
    }

    #[test]
    fn test_rows_without_coordinates_are_not_grouped() {
        let mut no_coords = CanonicalPermit::empty(SourceSystem::DobNow);
        no_coords.issued_date = NaiveDate::from_ymd_opt(2017, 3, 1);
        let permits = vec![
            permit(SourceSystem::DobHistorical, 40.7, -74.0, (2017, 3, 1)),
            no_coords,
        ];

        let report = detect_overlap(&permits, window());
        assert_eq!(report.rows_in_window, 2);
        assert_eq!(report.groups, 1);
        assert_eq!(report.cross_system_collisions, 0);
    }

    #[test]
    fn test_detection_does_not_touch_input() {
        let permits = vec![
            permit(SourceSystem::DobHistorical, 40.7, -74.0, (2017, 3, 1)),
            permit(SourceSystem::DobNow, 40.7, -74.0, (2017, 3, 1)),
        ];
        let before = permits.clone();
        let _ = detect_overlap(&permits, window());
        assert_eq!(permits, before);
    }

    #[test]
    fn test_coordinate_key_uses_five_decimals() {
        assert_eq!(coordinate_key(40.123_456), 4_012_346);
        assert_eq!(coordinate_key(-73.999_994), -7_399_999);
    }
}
