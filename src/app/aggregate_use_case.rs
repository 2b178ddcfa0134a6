use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, info_span};

use crate::observability::metrics;
use crate::pipeline::processing::aggregate::{
    aggregate_monthly, filter_modeling, AggregationReport, ModelingReport,
};
use crate::pipeline::storage::{RunManifest, StoredOutput, TableStore};
use crate::types::MonthlyAggregate;

pub const STAGE: &str = "aggregate";

#[derive(Debug, Clone)]
pub struct AggregateInputs {
    pub enriched: PathBuf,
    pub monthly_output: PathBuf,
    pub modeling_output: PathBuf,
    pub min_district_total: u64,
}

#[derive(Debug, Clone)]
pub struct AggregateOutcome {
    pub aggregation: AggregationReport,
    pub modeling: ModelingReport,
    pub manifest: RunManifest,
}

/// Use case for building the monthly district counts and their modeling subset
pub struct AggregateUseCase<'a> {
    store: &'a dyn TableStore,
}

impl<'a> AggregateUseCase<'a> {
    pub fn new(store: &'a dyn TableStore) -> Self {
        Self { store }
    }

    pub fn execute(
        &self,
        inputs: &AggregateInputs,
        manifest_dir: &Path,
    ) -> Result<AggregateOutcome> {
        let span = info_span!("aggregate");
        let _enter = span.enter();
        let started = Instant::now();
        let mut manifest = RunManifest::start(STAGE);

        let enriched = self
            .store
            .read_enriched(&inputs.enriched)
            .with_context(|| format!("reading enriched table from {}", inputs.enriched.display()))?;

        let (monthly, aggregation) = aggregate_monthly(&enriched);
        info!(
            "{} monthly rows across {} districts \
             ({} rows lacked an issue date, {} lacked a district)",
            aggregation.aggregate_rows,
            aggregation.districts,
            aggregation.missing_issued_date,
            aggregation.missing_boro_cd
        );
        let (modeling_rows, modeling) = filter_modeling(&monthly, inputs.min_district_total);
        info!(
            "Modeling subset keeps {} districts with at least {} permits, drops {}",
            modeling.kept_districts.len(),
            inputs.min_district_total,
            modeling.dropped_districts.len()
        );
        metrics::aggregate::rows(monthly.len(), modeling_rows.len());
        metrics::aggregate::districts_dropped(modeling.dropped_districts.len());

        manifest.record("monthly", self.write(&inputs.monthly_output, &monthly)?);
        manifest.record("modeling", self.write(&inputs.modeling_output, &modeling_rows)?);
        let manifest = manifest.finish(self.store, manifest_dir)?;
        metrics::stage_duration(STAGE, started.elapsed().as_secs_f64());

        Ok(AggregateOutcome {
            aggregation,
            modeling,
            manifest,
        })
    }

    fn write(&self, path: &Path, rows: &[MonthlyAggregate]) -> Result<StoredOutput> {
        self.store
            .write_aggregates(path, rows)
            .with_context(|| format!("writing monthly aggregate to {}", path.display()))
    }
}
