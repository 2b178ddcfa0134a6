use serde::{Deserialize, Serialize};

use crate::spatial::{DistrictMatch, DistrictSet};
use crate::types::{CanonicalPermit, GeoEnrichedPermit};

/// Counts describing one spatial join
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    /// District polygons available to the join
    pub polygons: usize,
    pub with_coordinates: usize,
    pub without_coordinates: usize,
    /// Output rows; always equal to the input row count
    pub joined_rows: usize,
    /// Rows left without a district, for any reason
    pub boro_cd_nulls: usize,
    /// Rows with coordinates that fell inside no district
    pub outside_all: usize,
    /// Rows whose point lay inside more than one district
    pub multi_match: usize,
}

impl EnrichmentReport {
    pub fn matched(&self) -> usize {
        self.joined_rows - self.boro_cd_nulls
    }
}

/// Trait for labelling permits with the district they fall in
pub trait DistrictAssigner {
    /// Locate one (longitude, latitude) point
    fn locate(&self, lon: f64, lat: f64) -> DistrictMatch;

    /// Number of polygons consulted
    fn polygon_count(&self) -> usize;

    /// Left-join every permit onto the districts.
    ///
    /// Permits without both coordinates skip the lookup. Output order and length
    /// match the input.
    fn assign(&self, permits: Vec<CanonicalPermit>) -> (Vec<GeoEnrichedPermit>, EnrichmentReport) {
        let mut report = EnrichmentReport {
            polygons: self.polygon_count(),
            ..Default::default()
        };

        let enriched: Vec<GeoEnrichedPermit> = permits
            .into_iter()
            .map(|permit| {
                let boro_cd = match permit.coordinates() {
                    Some((lat, lon)) => {
                        report.with_coordinates += 1;
                        let located = self.locate(lon, lat);
                        match located {
                            DistrictMatch::Outside => report.outside_all += 1,
                            DistrictMatch::Ambiguous { .. } => report.multi_match += 1,
                            DistrictMatch::Unique(_) => {}
                        }
                        located.boro_cd()
                    }
                    None => {
                        report.without_coordinates += 1;
                        None
                    }
                };
                if boro_cd.is_none() {
                    report.boro_cd_nulls += 1;
                }
                GeoEnrichedPermit { permit, boro_cd }
            })
            .collect();

        report.joined_rows = enriched.len();
        (enriched, report)
    }
}

/// Point-in-polygon assigner over community district boundaries
pub struct PolygonDistrictAssigner {
    districts: DistrictSet,
}

impl PolygonDistrictAssigner {
    pub fn new(districts: DistrictSet) -> Self {
        Self { districts }
    }
}

impl DistrictAssigner for PolygonDistrictAssigner {
    fn locate(&self, lon: f64, lat: f64) -> DistrictMatch {
        self.districts.locate(lon, lat)
    }

    fn polygon_count(&self) -> usize {
        self.districts.district_count()
    }
}
