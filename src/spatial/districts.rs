use geo::{Area, BoundingRect, Contains, Coord, LineString, MultiPolygon, Point, Polygon, Rect};
use geojson::{GeoJson, Value as Geometry};
use serde_json::Value;
use shapefile::dbase::{self, FieldValue};
use shapefile::{PolygonRing, Shape, ShapeReader};
use std::io::Cursor;
use tracing::debug;

use super::crs::{Crs, Reprojector};
use crate::constants::BORO_CD_COLUMN;
use crate::error::{PipelineError, Result};

/// A community district boundary in WGS84
#[derive(Debug, Clone)]
pub struct District {
    pub boro_cd: i32,
    pub geometry: MultiPolygon<f64>,
    bbox: Rect<f64>,
    area: f64,
}

impl District {
    pub fn new(boro_cd: i32, geometry: MultiPolygon<f64>) -> Result<Self> {
        let bbox = geometry.bounding_rect().ok_or_else(|| {
            PipelineError::InvalidDistricts(format!("district {} has an empty geometry", boro_cd))
        })?;
        let area = geometry.unsigned_area();
        Ok(Self {
            boro_cd,
            geometry,
            bbox,
            area,
        })
    }

    /// Interior containment; a point on the boundary is not within the district
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let min = self.bbox.min();
        let max = self.bbox.max();
        if lon < min.x || lon > max.x || lat < min.y || lat > max.y {
            return false;
        }
        self.geometry.contains(&Point::new(lon, lat))
    }
}

/// Outcome of locating one point among the districts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistrictMatch {
    Outside,
    Unique(i32),
    /// Several districts contain the point; the smallest one was chosen
    Ambiguous { chosen: i32, candidates: usize },
}

impl DistrictMatch {
    pub fn boro_cd(&self) -> Option<i32> {
        match self {
            DistrictMatch::Outside => None,
            DistrictMatch::Unique(boro_cd) => Some(*boro_cd),
            DistrictMatch::Ambiguous { chosen, .. } => Some(*chosen),
        }
    }
}

/// All district polygons, reprojected to WGS84
#[derive(Debug, Clone)]
pub struct DistrictSet {
    districts: Vec<District>,
    source_crs: Crs,
}

impl DistrictSet {
    pub fn new(districts: Vec<District>, source_crs: Crs) -> Self {
        Self {
            districts,
            source_crs,
        }
    }

    pub fn district_count(&self) -> usize {
        self.districts.len()
    }

    pub fn source_crs(&self) -> &Crs {
        &self.source_crs
    }

    /// Find the district whose interior contains the point.
    ///
    /// Overlapping boundaries resolve to the smallest-area district, then the
    /// lowest BoroCD.
    pub fn locate(&self, lon: f64, lat: f64) -> DistrictMatch {
        let mut best: Option<&District> = None;
        let mut candidates = 0usize;

        for district in self.districts.iter().filter(|d| d.contains(lon, lat)) {
            candidates += 1;
            best = match best {
                Some(current)
                    if (current.area, current.boro_cd) <= (district.area, district.boro_cd) =>
                {
                    Some(current)
                }
                _ => Some(district),
            };
        }

        match (best, candidates) {
            (None, _) => DistrictMatch::Outside,
            (Some(district), 1) => DistrictMatch::Unique(district.boro_cd),
            (Some(district), n) => DistrictMatch::Ambiguous {
                chosen: district.boro_cd,
                candidates: n,
            },
        }
    }
}

/// Rings in source coordinates, exterior first
type SourcePolygon = Vec<Vec<(f64, f64)>>;

/// One boundary feature as read from the file, before reprojection
struct SourceDistrict {
    boro_cd: i32,
    polygons: Vec<SourcePolygon>,
}

/// Parse district boundaries from a GeoJSON FeatureCollection.
///
/// The source CRS comes from `crs_override` when set, else the document's `crs`
/// member, else WGS84 as RFC 7946 prescribes.
pub fn parse_geojson_districts(text: &str, crs_override: Option<Crs>) -> Result<DistrictSet> {
    let collection = match text.parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(collection)) => collection,
        Ok(_) => {
            return Err(PipelineError::InvalidDistricts(
                "expected a GeoJSON FeatureCollection".to_string(),
            ))
        }
        Err(e) => {
            return Err(PipelineError::InvalidDistricts(format!(
                "unreadable GeoJSON: {}",
                e
            )))
        }
    };

    let declared = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(Value::as_str);
    let source_crs = match (crs_override, declared) {
        (Some(crs), _) => crs,
        (None, Some(name)) => Crs::parse(name)?,
        (None, None) => Crs::wgs84(),
    };

    let mut features = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.iter().enumerate() {
        let boro_cd = json_boro_cd(feature.property(BORO_CD_COLUMN), index)?;
        let polygons = match feature.geometry.as_ref().map(|geometry| &geometry.value) {
            Some(Geometry::Polygon(rings)) => vec![position_rings(rings, boro_cd)?],
            Some(Geometry::MultiPolygon(polygons)) => polygons
                .iter()
                .map(|rings| position_rings(rings, boro_cd))
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(no_polygon(index, boro_cd)),
        };
        features.push(SourceDistrict { boro_cd, polygons });
    }

    build_district_set(features, source_crs)
}

/// Parse district boundaries from the contents of a shapefile's `.shp` and
/// `.dbf` members.
///
/// The source CRS comes from `crs_override` when set, else the `.prj` WKT,
/// else WGS84.
pub fn parse_shapefile_districts(
    shp: &[u8],
    dbf: &[u8],
    prj: Option<&str>,
    crs_override: Option<Crs>,
) -> Result<DistrictSet> {
    let source_crs = match (crs_override, prj) {
        (Some(crs), _) => crs,
        (None, Some(wkt)) => Crs::from_wkt(wkt)?,
        (None, None) => Crs::wgs84(),
    };

    let shapes = ShapeReader::new(Cursor::new(shp)).map_err(shapefile_error)?;
    let records = dbase::Reader::new(Cursor::new(dbf))
        .map_err(|e| PipelineError::InvalidDistricts(format!("unreadable .dbf: {}", e)))?;
    let mut reader = shapefile::Reader::new(shapes, records);

    let mut features = Vec::new();
    for (index, item) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = item.map_err(shapefile_error)?;
        let boro_cd = dbf_boro_cd(record.get(BORO_CD_COLUMN), index)?;
        let polygons = match shape {
            Shape::Polygon(polygon) => group_rings(polygon.rings(), |p| (p.x, p.y)),
            Shape::PolygonM(polygon) => group_rings(polygon.rings(), |p| (p.x, p.y)),
            Shape::PolygonZ(polygon) => group_rings(polygon.rings(), |p| (p.x, p.y)),
            _ => return Err(no_polygon(index, boro_cd)),
        };
        features.push(SourceDistrict { boro_cd, polygons });
    }

    build_district_set(features, source_crs)
}

fn build_district_set(features: Vec<SourceDistrict>, source_crs: Crs) -> Result<DistrictSet> {
    if features.is_empty() {
        return Err(PipelineError::InvalidDistricts(
            "no district features found".to_string(),
        ));
    }

    if !source_crs.is_wgs84() {
        debug!("Reprojecting district vertices from {} to WGS84", source_crs);
    }
    let reprojector = source_crs.reprojector()?;
    let mut districts = Vec::with_capacity(features.len());
    for feature in features {
        let polygons = feature
            .polygons
            .iter()
            .map(|rings| reproject_polygon(rings, &reprojector, feature.boro_cd))
            .collect::<Result<Vec<_>>>()?;
        debug!("District {} parsed", feature.boro_cd);
        districts.push(District::new(feature.boro_cd, MultiPolygon::new(polygons))?);
    }

    Ok(DistrictSet::new(districts, source_crs))
}

fn reproject_polygon(
    rings: &[Vec<(f64, f64)>],
    reprojector: &Reprojector,
    boro_cd: i32,
) -> Result<Polygon<f64>> {
    let mut rings = rings
        .iter()
        .map(|ring| {
            ring.iter()
                .map(|&(x, y)| reprojector.to_wgs84(x, y).map(|(x, y)| Coord { x, y }))
                .collect::<Result<Vec<_>>>()
                .map(LineString::new)
        })
        .collect::<Result<Vec<_>>>()?;
    if rings.is_empty() {
        return Err(PipelineError::InvalidDistricts(format!(
            "district {} has a polygon without rings",
            boro_cd
        )));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

fn position_rings(rings: &[Vec<Vec<f64>>], boro_cd: i32) -> Result<SourcePolygon> {
    rings
        .iter()
        .map(|ring| {
            ring.iter()
                .map(|position| match position.as_slice() {
                    [x, y, ..] => Ok((*x, *y)),
                    _ => Err(PipelineError::InvalidDistricts(format!(
                        "district {} has a position with fewer than two coordinates",
                        boro_cd
                    ))),
                })
                .collect()
        })
        .collect()
}

/// Shapefile polygons list outer rings each followed by their holes
fn group_rings<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> (f64, f64)) -> Vec<SourcePolygon> {
    let mut polygons: Vec<SourcePolygon> = Vec::new();
    for ring in rings {
        let coords = ring.points().iter().map(&xy).collect();
        match (ring, polygons.last_mut()) {
            (PolygonRing::Inner(_), Some(polygon)) => polygon.push(coords),
            _ => polygons.push(vec![coords]),
        }
    }
    polygons
}

fn json_boro_cd(value: Option<&Value>, index: usize) -> Result<i32> {
    let value = value.ok_or_else(|| missing_boro_cd(index))?;
    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .or_else(|| number.as_f64().and_then(integral)),
        Value::String(text) => text.trim().parse::<i32>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| non_integer_boro_cd(index, value))
}

fn dbf_boro_cd(value: Option<&FieldValue>, index: usize) -> Result<i32> {
    let value = value.ok_or_else(|| missing_boro_cd(index))?;
    let parsed = match value {
        FieldValue::Numeric(Some(v)) | FieldValue::Double(v) => integral(*v),
        FieldValue::Float(Some(v)) => integral(f64::from(*v)),
        FieldValue::Integer(v) => Some(*v),
        FieldValue::Character(Some(text)) => text.trim().parse::<i32>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| non_integer_boro_cd(index, &format!("{:?}", value)))
}

fn integral(value: f64) -> Option<i32> {
    (value.fract() == 0.0 && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX))
        .then_some(value as i32)
}

fn missing_boro_cd(index: usize) -> PipelineError {
    PipelineError::InvalidDistricts(format!(
        "feature {} has no {} property",
        index, BORO_CD_COLUMN
    ))
}

fn non_integer_boro_cd(index: usize, value: &dyn std::fmt::Display) -> PipelineError {
    PipelineError::InvalidDistricts(format!(
        "feature {} has a non-integer {}: {}",
        index, BORO_CD_COLUMN, value
    ))
}

fn no_polygon(index: usize, boro_cd: i32) -> PipelineError {
    PipelineError::InvalidDistricts(format!(
        "feature {} (BoroCD {}) has no polygon geometry",
        index, boro_cd
    ))
}

fn shapefile_error(e: shapefile::Error) -> PipelineError {
    PipelineError::InvalidDistricts(format!("unreadable shapefile: {}", e))
}
