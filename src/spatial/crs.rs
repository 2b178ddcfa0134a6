//! Coordinate reference systems the district boundaries may arrive in, and
//! reprojection of their coordinates to WGS84 longitude/latitude.
//!
//! Every CRS resolves to a PROJ definition: EPSG codes through the bundled
//! `crs-definitions` table, WKT (shapefile `.prj`) through [`WktNode`], and
//! `+proj=` strings as given. Datum shifts apply only when the definition
//! carries `+towgs84` or `+datum`.

use proj4rs::transform::transform;
use proj4rs::Proj;
use std::fmt;

use super::wkt::WktNode;
use crate::error::{PipelineError, Result};

const WGS84_DEFINITION: &str = "+proj=longlat +datum=WGS84 +no_defs";

#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    name: String,
    /// PROJ definition; `None` for WGS84 longitude/latitude
    definition: Option<String>,
}

impl Crs {
    pub fn wgs84() -> Self {
        Self {
            name: "EPSG:4326".to_string(),
            definition: None,
        }
    }

    pub fn from_epsg(code: u16) -> Result<Self> {
        if code == 4326 {
            return Ok(Self::wgs84());
        }
        let def = crs_definitions::from_code(code)
            .ok_or_else(|| PipelineError::UnsupportedCrs(format!("EPSG:{}", code)))?;
        Self::from_proj(format!("EPSG:{}", code), def.proj4)
    }

    pub fn from_proj(name: impl Into<String>, definition: &str) -> Result<Self> {
        let name = name.into();
        Proj::from_proj_string(definition)
            .map_err(|e| PipelineError::UnsupportedCrs(format!("{}: {}", name, e)))?;
        Ok(Self {
            name,
            definition: Some(definition.trim().to_string()),
        })
    }

    /// Resolve a WKT definition, preferring its EPSG identifier when it has one
    pub fn from_wkt(wkt: &str) -> Result<Self> {
        let node = WktNode::parse(wkt)?;
        if let Some(crs) = node.epsg_code().and_then(|code| Self::from_epsg(code).ok()) {
            return Ok(crs);
        }
        let definition = node.to_proj_string()?;
        Self::from_proj(node.name().unwrap_or(&node.keyword).to_string(), &definition)
    }

    /// Parse an identifier such as `EPSG:2263`, `urn:ogc:def:crs:EPSG::4326`
    /// or `urn:ogc:def:crs:OGC:1.3:CRS84`, a `+proj=` string, or WKT
    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("+PROJ=") {
            return Self::from_proj(trimmed, trimmed);
        }
        if upper.contains('[') || upper.contains('(') {
            return Self::from_wkt(trimmed);
        }
        if upper.ends_with("CRS84") {
            return Ok(Self::wgs84());
        }
        let code = upper
            .contains("EPSG")
            .then(|| upper.rsplit(':').next())
            .flatten()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| PipelineError::UnsupportedCrs(name.to_string()))?;
        Self::from_epsg(code)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_wgs84(&self) -> bool {
        self.definition.is_none()
    }

    pub fn reprojector(&self) -> Result<Reprojector> {
        let Some(definition) = &self.definition else {
            return Ok(Reprojector { source: None });
        };
        let proj = |definition: &str| {
            Proj::from_proj_string(definition)
                .map_err(|e| PipelineError::UnsupportedCrs(format!("{}: {}", self.name, e)))
        };
        let lower = definition.to_ascii_lowercase();
        let geographic = ["+proj=longlat", "+proj=latlong", "+proj=lonlat", "+proj=latlon"]
            .iter()
            .any(|p| lower.contains(p));
        Ok(Reprojector {
            source: Some(Projection {
                source: proj(definition)?,
                target: proj(WGS84_DEFINITION)?,
                geographic,
            }),
        })
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

struct Projection {
    source: Proj,
    target: Proj,
    /// Source coordinates are degrees, which proj4rs takes as radians
    geographic: bool,
}

/// Converts coordinates of one CRS into WGS84 (longitude, latitude) degrees
pub struct Reprojector {
    source: Option<Projection>,
}

impl Reprojector {
    pub fn to_wgs84(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let Some(projection) = &self.source else {
            return Ok((x, y));
        };
        let mut point = if projection.geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&projection.source, &projection.target, &mut point).map_err(|e| {
            PipelineError::InvalidDistricts(format!("cannot reproject ({}, {}): {}", x, y, e))
        })?;
        Ok((point.0.to_degrees(), point.1.to_degrees()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::shapefile_fixture::NY_LONG_ISLAND_PRJ;

    fn assert_near(actual: (f64, f64), expected: (f64, f64), tolerance: f64) {
        assert!(
            (actual.0 - expected.0).abs() < tolerance && (actual.1 - expected.1).abs() < tolerance,
            "{:?} is not within {} of {:?}",
            actual,
            tolerance,
            expected
        );
    }

    #[test]
    fn test_parse_identifiers() {
        assert!(Crs::parse("EPSG:4326").unwrap().is_wgs84());
        assert!(Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap().is_wgs84());
        assert_eq!(Crs::parse("urn:ogc:def:crs:EPSG::2263").unwrap().name(), "EPSG:2263");
        assert_eq!(Crs::parse("epsg:32618").unwrap().to_string(), "EPSG:32618");
        assert!(!Crs::parse("+proj=utm +zone=18 +datum=WGS84").unwrap().is_wgs84());
    }

    #[test]
    fn test_unresolvable_crs() {
        for name in ["EPSG:99999", "EPSG:1", "nonsense", "+proj=nonsense"] {
            assert!(
                matches!(Crs::parse(name), Err(PipelineError::UnsupportedCrs(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn test_wgs84_is_identity() {
        let reprojector = Crs::wgs84().reprojector().unwrap();
        assert_eq!(reprojector.to_wgs84(-73.98, 40.75).unwrap(), (-73.98, 40.75));
    }

    #[test]
    fn test_ny_long_island_midtown() {
        // Empire State Building, approximately (988_000 ftUS, 211_900 ftUS)
        let reprojector = Crs::from_epsg(2263).unwrap().reprojector().unwrap();
        let point = reprojector.to_wgs84(988_000.0, 211_900.0).unwrap();
        assert_near(point, (-73.9857, 40.7484), 0.01);
    }

    #[test]
    fn test_prj_matches_epsg_definition() {
        let from_prj = Crs::from_wkt(NY_LONG_ISLAND_PRJ).unwrap();
        assert_eq!(
            from_prj.name(),
            "NAD_1983_StatePlane_New_York_Long_Island_FIPS_3104_Feet"
        );
        let from_epsg = Crs::from_epsg(2263).unwrap();

        for (x, y) in [(988_000.0, 211_900.0), (1_010_000.0, 180_000.0)] {
            let expected = from_epsg.reprojector().unwrap().to_wgs84(x, y).unwrap();
            let actual = from_prj.reprojector().unwrap().to_wgs84(x, y).unwrap();
            assert_near(actual, expected, 1e-5);
        }
    }

    #[test]
    fn test_utm_zone() {
        // Easting 500 km lies on the zone's central meridian, 75°W
        let reprojector = Crs::parse("EPSG:32618").unwrap().reprojector().unwrap();
        let (lon, lat) = reprojector.to_wgs84(500_000.0, 4_500_000.0).unwrap();
        assert!((lon - -75.0).abs() < 1e-6, "lon {lon}");
        assert!((lat - 40.65).abs() < 0.05, "lat {lat}");
    }

    #[test]
    fn test_geographic_source_in_degrees() {
        let crs = Crs::parse("+proj=longlat +ellps=WGS84 +no_defs").unwrap();
        let point = crs.reprojector().unwrap().to_wgs84(-73.98, 40.75).unwrap();
        assert_near(point, (-73.98, 40.75), 1e-9);
    }
}
