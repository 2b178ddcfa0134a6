use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use chrono::NaiveDate;
use std::fmt;
use std::path::Path;
use tracing::info_span;

use crate::pipeline::processing::aggregate::{district_totals, filter_modeling};
use crate::pipeline::storage::parquet::aggregates_to_batch;
use crate::pipeline::storage::TableStore;
use crate::types::MonthlyAggregate;

/// Shape of the modeling subset re-derived from a full monthly aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectSummary {
    pub full_rows: usize,
    pub full_districts: usize,
    pub min_district_total: u64,
    pub modeling_rows: usize,
    pub modeling_districts: usize,
    pub dropped_districts: Vec<i32>,
    pub first_month: Option<NaiveDate>,
    pub last_month: Option<NaiveDate>,
    /// Pretty-printed leading modeling rows
    pub preview: String,
}

impl fmt::Display for InspectSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Full aggregate: {} rows, {} districts", self.full_rows, self.full_districts)?;
        writeln!(
            f,
            "Modeling (>= {} permits): {} rows, {} districts",
            self.min_district_total, self.modeling_rows, self.modeling_districts
        )?;
        writeln!(f, "Dropped districts: {:?}", self.dropped_districts)?;
        match (self.first_month, self.last_month) {
            (Some(first), Some(last)) => writeln!(f, "Months: {} to {}", first, last)?,
            _ => writeln!(f, "Months: none")?,
        }
        write!(f, "{}", self.preview)
    }
}

/// Use case for checking what the modeling filter does to a persisted aggregate
pub struct InspectUseCase<'a> {
    store: &'a dyn TableStore,
}

impl<'a> InspectUseCase<'a> {
    pub fn new(store: &'a dyn TableStore) -> Self {
        Self { store }
    }

    pub fn execute(
        &self,
        monthly: &Path,
        min_district_total: u64,
        preview_rows: usize,
    ) -> Result<InspectSummary> {
        let span = info_span!("inspect");
        let _enter = span.enter();

        let rows = self
            .store
            .read_aggregates(monthly)
            .with_context(|| format!("reading monthly aggregate from {}", monthly.display()))?;
        let (modeling, report) = filter_modeling(&rows, min_district_total);

        Ok(InspectSummary {
            full_rows: rows.len(),
            full_districts: district_totals(&rows).len(),
            min_district_total,
            modeling_rows: modeling.len(),
            modeling_districts: report.kept_districts.len(),
            dropped_districts: report.dropped_districts,
            first_month: modeling.iter().map(|r| r.month).min(),
            last_month: modeling.iter().map(|r| r.month).max(),
            preview: preview(&modeling[..modeling.len().min(preview_rows)])?,
        })
    }
}

fn preview(rows: &[MonthlyAggregate]) -> Result<String> {
    let batch = aggregates_to_batch(rows)?;
    Ok(pretty_format_batches(&[batch])?.to_string())
}
