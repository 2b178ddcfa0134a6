use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, info_span, warn};

use crate::observability::metrics;
use crate::pipeline::processing::baseline::{evaluate_baseline, BaselineReport, BaselineSettings};
use crate::pipeline::storage::{RunManifest, TableStore};

pub const STAGE: &str = "baseline";

#[derive(Debug, Clone)]
pub struct BaselineInputs {
    pub modeling: PathBuf,
    pub output: PathBuf,
    pub settings: BaselineSettings,
}

#[derive(Debug, Clone)]
pub struct BaselineOutcome {
    pub report: BaselineReport,
    pub manifest: RunManifest,
}

/// Use case for scoring the rolling-mean forecast on the modeling aggregate
pub struct BaselineUseCase<'a> {
    store: &'a dyn TableStore,
}

impl<'a> BaselineUseCase<'a> {
    pub fn new(store: &'a dyn TableStore) -> Self {
        Self { store }
    }

    pub fn execute(&self, inputs: &BaselineInputs, manifest_dir: &Path) -> Result<BaselineOutcome> {
        let span = info_span!("baseline");
        let _enter = span.enter();
        let started = Instant::now();
        let mut manifest = RunManifest::start(STAGE);

        let rows = self
            .store
            .read_aggregates(&inputs.modeling)
            .with_context(|| {
                format!("reading modeling aggregate from {}", inputs.modeling.display())
            })?;
        let report = evaluate_baseline(&rows, inputs.settings);

        match (
            report.last_complete_month,
            report.avg_validation_mae,
            report.avg_validation_smape,
        ) {
            (Some(last), Some(mae), Some(smape)) => info!(
                "Last complete month {}: {} districts evaluated, \
                 avg validation MAE {:.4}, sMAPE {:.4}",
                last,
                report.districts_evaluated(),
                mae,
                smape
            ),
            (last, _, _) => warn!(
                "No district had {} months of history before the last complete month {:?}",
                inputs.settings.window_months,
                last
            ),
        }
        metrics::baseline::report(&report);

        let json = serde_json::to_vec_pretty(&report)?;
        let output = self
            .store
            .write_document(&inputs.output, &json, report.districts_evaluated())
            .with_context(|| format!("writing baseline report to {}", inputs.output.display()))?;
        manifest.record("baseline_report", output);
        let manifest = manifest.finish(self.store, manifest_dir)?;
        metrics::stage_duration(STAGE, started.elapsed().as_secs_f64());

        Ok(BaselineOutcome { report, manifest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::InMemoryTableStore;
    use crate::types::MonthlyAggregate;
    use chrono::{Months, NaiveDate};

    #[test]
    fn test_report_is_written_as_json() {
        let store = InMemoryTableStore::new();
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let rows: Vec<MonthlyAggregate> = (0..26)
            .map(|i| MonthlyAggregate {
                boro_cd: 101,
                month: start.checked_add_months(Months::new(i)).unwrap(),
                permit_count: 40,
            })
            .collect();
        store.write_aggregates(Path::new("modeling.parquet"), &rows).unwrap();

        let inputs = BaselineInputs {
            modeling: "modeling.parquet".into(),
            output: "baseline.json".into(),
            settings: BaselineSettings {
                window_months: 12,
                holdout_months: 12,
            },
        };
        let outcome = BaselineUseCase::new(&store)
            .execute(&inputs, Path::new("manifests"))
            .unwrap();

        let bytes = store.read_document(Path::new("baseline.json")).unwrap();
        let written: BaselineReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(written, outcome.report);
        assert_eq!(written.districts.len(), 1);
        assert_eq!(written.districts[0].boro_cd, 101);
        assert_eq!(outcome.manifest.output("baseline_report").unwrap().rows, 1);
    }
}
