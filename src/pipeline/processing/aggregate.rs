use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{GeoEnrichedPermit, MonthlyAggregate};

/// What the aggregation kept and dropped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub input_rows: usize,
    pub missing_issued_date: usize,
    pub missing_boro_cd: usize,
    /// Rows in the full monthly aggregate
    pub aggregate_rows: usize,
    pub districts: usize,
}

/// Which districts the modeling filter kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelingReport {
    pub min_district_total: u64,
    pub kept_districts: Vec<i32>,
    pub dropped_districts: Vec<i32>,
    pub rows: usize,
}

/// First day of the date's month
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Count permits per (BoroCD, month), sorted ascending by both keys.
///
/// Rows without an issue date or a district are dropped and counted.
pub fn aggregate_monthly(
    permits: &[GeoEnrichedPermit],
) -> (Vec<MonthlyAggregate>, AggregationReport) {
    let mut counts: BTreeMap<(i32, NaiveDate), u64> = BTreeMap::new();
    let mut report = AggregationReport {
        input_rows: permits.len(),
        ..Default::default()
    };

    for enriched in permits {
        let Some(issued) = enriched.permit.issued_date else {
            report.missing_issued_date += 1;
            continue;
        };
        let Some(boro_cd) = enriched.boro_cd else {
            report.missing_boro_cd += 1;
            continue;
        };
        *counts.entry((boro_cd, month_start(issued))).or_insert(0) += 1;
    }

    let rows: Vec<MonthlyAggregate> = counts
        .into_iter()
        .map(|((boro_cd, month), permit_count)| MonthlyAggregate {
            boro_cd,
            month,
            permit_count,
        })
        .collect();

    report.aggregate_rows = rows.len();
    report.districts = district_totals(&rows).len();
    (rows, report)
}

/// Total permits per district across all months
pub fn district_totals(rows: &[MonthlyAggregate]) -> BTreeMap<i32, u64> {
    let mut totals = BTreeMap::new();
    for row in rows {
        *totals.entry(row.boro_cd).or_insert(0) += row.permit_count;
    }
    totals
}

/// Keep only districts whose all-time total reaches `min_district_total` (inclusive)
pub fn filter_modeling(
    rows: &[MonthlyAggregate],
    min_district_total: u64,
) -> (Vec<MonthlyAggregate>, ModelingReport) {
    let totals = district_totals(rows);
    let (kept, dropped): (Vec<(i32, u64)>, Vec<(i32, u64)>) = totals
        .into_iter()
        .partition(|(_, total)| *total >= min_district_total);
    let kept_districts: Vec<i32> = kept.into_iter().map(|(boro_cd, _)| boro_cd).collect();
    let dropped_districts: Vec<i32> = dropped.into_iter().map(|(boro_cd, _)| boro_cd).collect();

    let modeling: Vec<MonthlyAggregate> = rows
        .iter()
        .filter(|row| kept_districts.binary_search(&row.boro_cd).is_ok())
        .copied()
        .collect();

    let report = ModelingReport {
        min_district_total,
        kept_districts,
        dropped_districts,
        rows: modeling.len(),
    };
    (modeling, report)
}
