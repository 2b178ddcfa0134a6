use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, info_span, warn};

use crate::error::PipelineError;
use crate::observability::metrics;
use crate::pipeline::processing::enrich::{
    DistrictAssigner, EnrichmentReport, PolygonDistrictAssigner,
};
use crate::pipeline::storage::{RunManifest, StoredOutput, TableStore};
use crate::spatial::{parse_geojson_districts, parse_shapefile_districts, Crs, DistrictSet};

pub const STAGE: &str = "assign_districts";

#[derive(Debug, Clone)]
pub struct EnrichInputs {
    pub unified: PathBuf,
    pub districts: PathBuf,
    pub output: PathBuf,
    /// Overrides the CRS declared by the districts file
    pub crs_override: Option<Crs>,
}

#[derive(Debug, Clone)]
pub struct EnrichOutcome {
    pub report: EnrichmentReport,
    pub output: StoredOutput,
    pub manifest: RunManifest,
}

/// Use case for attaching a community district to every unified permit
pub struct EnrichUseCase<'a> {
    store: &'a dyn TableStore,
}

impl<'a> EnrichUseCase<'a> {
    pub fn new(store: &'a dyn TableStore) -> Self {
        Self { store }
    }

    /// Load district polygons from a shapefile (`.shp` with its `.dbf` and
    /// optional `.prj` siblings) or a GeoJSON document
    pub fn load_districts(&self, path: &Path, crs_override: Option<Crs>) -> Result<DistrictSet> {
        let is_shapefile = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"));
        let districts = if is_shapefile {
            self.load_shapefile(path, crs_override)?
        } else {
            let text = String::from_utf8(self.read_boundary_file(path)?).map_err(|e| {
                PipelineError::InvalidDistricts(format!("{} is not UTF-8: {}", path.display(), e))
            })?;
            parse_geojson_districts(&text, crs_override)
                .with_context(|| format!("parsing district polygons in {}", path.display()))?
        };
        info!(
            "Loaded {} district polygons from {} (source crs {})",
            districts.district_count(),
            path.display(),
            districts.source_crs()
        );
        Ok(districts)
    }

    fn load_shapefile(&self, path: &Path, crs_override: Option<Crs>) -> Result<DistrictSet> {
        let shp = self.read_boundary_file(path)?;
        let dbf = self.read_boundary_file(&path.with_extension("dbf"))?;
        let prj_path = path.with_extension("prj");
        let prj = match self.store.read_document(&prj_path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(PipelineError::MissingInput(_)) => {
                if crs_override.is_none() {
                    warn!("{} not found; assuming WGS84 coordinates", prj_path.display());
                }
                None
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", prj_path.display()));
            }
        };
        parse_shapefile_districts(&shp, &dbf, prj.as_deref(), crs_override)
            .with_context(|| format!("parsing district polygons in {}", path.display()))
    }

    fn read_boundary_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.store
            .read_document(path)
            .with_context(|| format!("reading district polygons from {}", path.display()))
    }

    pub fn execute(&self, inputs: &EnrichInputs, manifest_dir: &Path) -> Result<EnrichOutcome> {
        let span = info_span!("assign_districts");
        let _enter = span.enter();
        let started = Instant::now();
        let mut manifest = RunManifest::start(STAGE);

        let districts = self.load_districts(&inputs.districts, inputs.crs_override.clone())?;
        let permits = self
            .store
            .read_unified(&inputs.unified)
            .with_context(|| format!("reading unified table from {}", inputs.unified.display()))?;

        let assigner = PolygonDistrictAssigner::new(districts);
        let (enriched, report) = assigner.assign(permits);

        info!(
            "Joined {} permits against {} polygons: {} matched, {} outside every district, \
             {} without coordinates",
            report.joined_rows,
            report.polygons,
            report.matched(),
            report.outside_all,
            report.without_coordinates
        );
        if report.multi_match > 0 {
            warn!(
                "{} permits fell inside more than one district; the smallest district was used",
                report.multi_match
            );
        }
        metrics::enrich::report(&report);

        let output = self
            .store
            .write_enriched(&inputs.output, &enriched)
            .with_context(|| format!("writing enriched table to {}", inputs.output.display()))?;
        manifest.record("enriched", output.clone());
        let manifest = manifest.finish(self.store, manifest_dir)?;
        metrics::stage_duration(STAGE, started.elapsed().as_secs_f64());

        Ok(EnrichOutcome {
            report,
            output,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BORO_CD_COLUMN;
    use crate::pipeline::storage::InMemoryTableStore;
    use crate::spatial::shapefile_fixture::{boro_cd_dbf, polygon_shp, NY_LONG_ISLAND_PRJ};
    use crate::types::{CanonicalPermit, SourceSystem};

    const DISTRICTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"BoroCD": 101},
             "geometry": {"type": "Polygon", "coordinates": [[
                [-74.0,40.7],[-73.9,40.7],[-73.9,40.8],[-74.0,40.8],[-74.0,40.7]
             ]]}}
        ]
    }"#;

    fn inputs() -> EnrichInputs {
        EnrichInputs {
            unified: "unified.parquet".into(),
            districts: "nycd.geojson".into(),
            output: "enriched.parquet".into(),
            crs_override: None,
        }
    }

    fn permit(lat: Option<f64>, lon: Option<f64>) -> CanonicalPermit {
        let mut p = CanonicalPermit::empty(SourceSystem::DobHistorical);
        p.latitude = lat;
        p.longitude = lon;
        p
    }

    #[test]
    fn test_enrich_preserves_rows_and_nulls() {
        let store = InMemoryTableStore::new();
        store
            .write_document(Path::new("nycd.geojson"), DISTRICTS.as_bytes(), 1)
            .unwrap();
        store
            .write_unified(
                Path::new("unified.parquet"),
                &[
                    permit(Some(40.75), Some(-73.95)),
                    permit(Some(40.75), None),
                    permit(Some(10.0), Some(10.0)),
                ],
            )
            .unwrap();

        let outcome = EnrichUseCase::new(&store)
            .execute(&inputs(), Path::new("manifests"))
            .unwrap();
        let enriched = store.read_enriched(Path::new("enriched.parquet")).unwrap();
        let codes: Vec<_> = enriched.iter().map(|e| e.boro_cd).collect();
        assert_eq!(codes, vec![Some(101), None, None]);
        assert_eq!(outcome.report.without_coordinates, 1);
        assert_eq!(outcome.report.outside_all, 1);
        assert_eq!(outcome.output.rows, 3);
    }

    #[test]
    fn test_missing_district_file_is_fatal() {
        let store = InMemoryTableStore::new();
        store
            .write_unified(Path::new("unified.parquet"), &[permit(None, None)])
            .unwrap();
        let err = EnrichUseCase::new(&store)
            .execute(&inputs(), Path::new("manifests"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInput(_))
        ));
        assert!(!store.contains("enriched.parquet"));
    }

    #[test]
    fn test_shapefile_with_prj_sidecar() {
        let store = InMemoryTableStore::new();
        // Two state plane squares around midtown, in US survey feet
        let shp = polygon_shp(&[(984_000.0, 208_000.0, 8_000.0), (992_000.0, 208_000.0, 8_000.0)]);
        store
            .write_document(Path::new("nycd/nycd.shp"), &shp, 2)
            .unwrap();
        store
            .write_document(
                Path::new("nycd/nycd.dbf"),
                &boro_cd_dbf(BORO_CD_COLUMN, &[105, 106]),
                2,
            )
            .unwrap();
        store
            .write_document(Path::new("nycd/nycd.prj"), NY_LONG_ISLAND_PRJ.as_bytes(), 1)
            .unwrap();
        store
            .write_unified(
                Path::new("unified.parquet"),
                &[
                    permit(Some(40.7484), Some(-73.9857)),
                    permit(Some(40.745), Some(-73.95)),
                    permit(Some(40.60), Some(-73.95)),
                ],
            )
            .unwrap();

        let inputs = EnrichInputs {
            districts: "nycd/nycd.shp".into(),
            ..inputs()
        };
        let outcome = EnrichUseCase::new(&store)
            .execute(&inputs, Path::new("manifests"))
            .unwrap();
        let enriched = store.read_enriched(Path::new("enriched.parquet")).unwrap();
        let codes: Vec<_> = enriched.iter().map(|e| e.boro_cd).collect();
        assert_eq!(codes, vec![Some(105), Some(106), None]);
        assert_eq!(outcome.report.polygons, 2);
    }

    #[test]
    fn test_shapefile_without_dbf_is_fatal() {
        let store = InMemoryTableStore::new();
        store
            .write_document(
                Path::new("nycd.shp"),
                &polygon_shp(&[(-74.0, 40.7, 0.1)]),
                1,
            )
            .unwrap();
        let err = EnrichUseCase::new(&store)
            .load_districts(Path::new("nycd.shp"), None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInput(_))
        ));
    }

    #[test]
    fn test_shapefile_without_prj_is_read_as_wgs84() {
        let store = InMemoryTableStore::new();
        store
            .write_document(
                Path::new("nycd.shp"),
                &polygon_shp(&[(-74.0, 40.7, 0.1)]),
                1,
            )
            .unwrap();
        store
            .write_document(Path::new("nycd.dbf"), &boro_cd_dbf(BORO_CD_COLUMN, &[101]), 1)
            .unwrap();
        let districts = EnrichUseCase::new(&store)
            .load_districts(Path::new("nycd.shp"), None)
            .unwrap();
        assert!(districts.source_crs().is_wgs84());
        assert_eq!(districts.locate(-73.95, 40.75).boro_cd(), Some(101));
    }
}
