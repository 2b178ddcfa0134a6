use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, info_span, warn};

use crate::observability::metrics;
use crate::pipeline::processing::normalize::NormalizationRegistry;
use crate::pipeline::processing::overlap::{detect_overlap, OverlapReport, OverlapWindow};
use crate::pipeline::storage::{RunManifest, StoredOutput, TableStore};
use crate::types::{CanonicalField, CanonicalPermit, SourceSystem};

pub const STAGE: &str = "unify";

/// Raw feed locations and the unified output path
#[derive(Debug, Clone)]
pub struct UnifyInputs {
    pub historical: PathBuf,
    pub dob_now: PathBuf,
    pub output: PathBuf,
}

impl UnifyInputs {
    fn source_path(&self, source: SourceSystem) -> &Path {
        match source {
            SourceSystem::DobHistorical => &self.historical,
            SourceSystem::DobNow => &self.dob_now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnifyOutcome {
    pub rows_per_source: BTreeMap<SourceSystem, usize>,
    pub degraded_cells: BTreeMap<SourceSystem, BTreeMap<CanonicalField, usize>>,
    pub overlap: OverlapReport,
    pub output: StoredOutput,
    pub manifest: RunManifest,
}

/// Use case for merging both raw feeds into the canonical permit table
pub struct UnifyUseCase<'a> {
    store: &'a dyn TableStore,
    registry: NormalizationRegistry,
}

impl<'a> UnifyUseCase<'a> {
    pub fn new(store: &'a dyn TableStore) -> Self {
        Self {
            store,
            registry: NormalizationRegistry::new(),
        }
    }

    /// Read and normalize one raw feed
    pub fn normalize_source(
        &self,
        source: SourceSystem,
        path: &Path,
    ) -> Result<(Vec<CanonicalPermit>, BTreeMap<CanonicalField, usize>)> {
        let normalizer = self.registry.normalizer(source)?;
        let raw = self
            .store
            .read_raw(source, path, &normalizer.required_columns())
            .with_context(|| format!("reading {} feed from {}", source, path.display()))?;
        let batch = normalizer.normalize(&raw)?;

        info!(
            "{}: {} rows normalized by {}",
            source,
            batch.permits.len(),
            normalizer.name()
        );
        metrics::unify::rows_read(source.as_str(), raw.len);
        for (field, count) in &batch.degraded_cells {
            warn!("{}: {} cells in {} degraded to missing", source, count, field.name());
            metrics::unify::cells_degraded(source.as_str(), field.name(), *count);
        }
        Ok((batch.permits, batch.degraded_cells))
    }

    /// Historical rows first, then DOB NOW rows
    pub fn execute(
        &self,
        inputs: &UnifyInputs,
        window: OverlapWindow,
        manifest_dir: &Path,
    ) -> Result<UnifyOutcome> {
        let span = info_span!("unify");
        let _enter = span.enter();
        let started = Instant::now();
        let mut manifest = RunManifest::start(STAGE);

        let mut unified = Vec::new();
        let mut rows_per_source = BTreeMap::new();
        let mut degraded_cells = BTreeMap::new();
        for source in SourceSystem::ALL {
            let (permits, degraded) = self.normalize_source(source, inputs.source_path(source))?;
            rows_per_source.insert(source, permits.len());
            degraded_cells.insert(source, degraded);
            unified.extend(permits);
        }
        metrics::unify::rows_unified(unified.len());

        let overlap = detect_overlap(&unified, window);
        info!(
            "Overlap {}..={}: {} rows in window, {} cross-source collisions covering {} records \
             (kept, not deduplicated)",
            window.start,
            window.end,
            overlap.rows_in_window,
            overlap.cross_system_collisions,
            overlap.records_in_collisions
        );
        metrics::overlap::report(&overlap);

        let output = self
            .store
            .write_unified(&inputs.output, &unified)
            .with_context(|| format!("writing unified table to {}", inputs.output.display()))?;
        manifest.record("unified", output.clone());
        let manifest = manifest.finish(self.store, manifest_dir)?;

        info!("Unified {} permits into {}", unified.len(), inputs.output.display());
        metrics::stage_duration(STAGE, started.elapsed().as_secs_f64());

        Ok(UnifyOutcome {
            rows_per_source,
            degraded_cells,
            overlap,
            output,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::InMemoryTableStore;
    use crate::types::RawTable;
    use chrono::NaiveDate;

    const HISTORICAL: &[&str] = &[
        "permit_si_no", "issuance_date", "filing_date", "expiration_date", "permit_status",
        "job_type", "work_type", "borough", "bin__", "block", "lot", "zip_code",
        "gis_latitude", "gis_longitude", "community_board", "gis_council_district",
        "gis_census_tract", "gis_nta_name",
    ];

    const DOB_NOW: &[&str] = &[
        "job_filing_number", "issued_date", "expired_date", "permit_status", "work_type",
        "borough", "bin", "block", "lot", "zip_code", "latitude", "longitude",
        "community_board", "council_district", "census_tract", "nta", "estimated_job_costs",
    ];

    fn inputs() -> UnifyInputs {
        UnifyInputs {
            historical: "raw/historical.parquet".into(),
            dob_now: "raw/dob_now.parquet".into(),
            output: "out/unified.parquet".into(),
        }
    }

    fn window() -> OverlapWindow {
        OverlapWindow {
            start: NaiveDate::from_ymd_opt(2016, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
        }
    }

    fn seeded_store() -> InMemoryTableStore {
        let store = InMemoryTableStore::new();
        store.insert_raw(
            "raw/historical.parquet",
            RawTable::from_rows(
                "historical",
                HISTORICAL,
                &[
                    vec![
                        ("permit_si_no", "12345"),
                        ("issuance_date", "01/15/2018"),
                        ("gis_latitude", "40.75"),
                        ("gis_longitude", "-73.98"),
                    ],
                    vec![("permit_si_no", "12346"), ("issuance_date", "garbage")],
                ],
            ),
        );
        store.insert_raw(
            "raw/dob_now.parquet",
            RawTable::from_rows(
                "dob_now",
                DOB_NOW,
                &[vec![
                    ("job_filing_number", "X1"),
                    ("issued_date", "2018-01-15"),
                    ("latitude", "40.75"),
                    ("longitude", "-73.98"),
                ]],
            ),
        );
        store
    }

    #[test]
    fn test_unify_concatenates_historical_first() {
        let store = seeded_store();
        let outcome = UnifyUseCase::new(&store)
            .execute(&inputs(), window(), Path::new("manifests"))
            .unwrap();

        let unified = store.read_unified(Path::new("out/unified.parquet")).unwrap();
        assert_eq!(unified.len(), 3);
        assert_eq!(unified[0].source_system, SourceSystem::DobHistorical);
        assert_eq!(unified[0].permit_id.as_deref(), Some("12345"));
        assert_eq!(unified[2].source_system, SourceSystem::DobNow);
        assert_eq!(unified[2].filing_date, None);
        assert_eq!(unified[2].job_type, None);

        assert_eq!(outcome.rows_per_source[&SourceSystem::DobHistorical], 2);
        assert_eq!(outcome.rows_per_source[&SourceSystem::DobNow], 1);
        assert_eq!(
            outcome.degraded_cells[&SourceSystem::DobHistorical].get(&CanonicalField::IssuedDate),
            Some(&1)
        );
        assert_eq!(outcome.output.rows, 3);
    }

    #[test]
    fn test_cross_source_duplicates_are_reported_and_kept() {
        let store = seeded_store();
        let outcome = UnifyUseCase::new(&store)
            .execute(&inputs(), window(), Path::new("manifests"))
            .unwrap();
        assert_eq!(outcome.overlap.cross_system_collisions, 1);
        assert_eq!(outcome.overlap.records_in_collisions, 2);
        assert_eq!(outcome.output.rows, 3);
    }

    #[test]
    fn test_manifest_records_unified_output() {
        let store = seeded_store();
        let outcome = UnifyUseCase::new(&store)
            .execute(&inputs(), window(), Path::new("manifests"))
            .unwrap();
        let manifest = RunManifest::load(&store, Path::new("manifests"), STAGE).unwrap();
        assert_eq!(manifest.run_id, outcome.manifest.run_id);
        assert_eq!(manifest.output("unified").unwrap().sha256, outcome.output.sha256);
    }

    #[test]
    fn test_missing_raw_column_aborts_without_output() {
        let store = InMemoryTableStore::new();
        store.insert_raw(
            "raw/historical.parquet",
            RawTable::from_rows("historical", &["permit_si_no"], &[]),
        );
        let err = UnifyUseCase::new(&store)
            .execute(&inputs(), window(), Path::new("manifests"))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("issuance_date"));
        assert!(!store.contains("out/unified.parquet"));
    }
}
