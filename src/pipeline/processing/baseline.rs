//! Rolling-mean baseline forecast per district.
//!
//! The prediction for a month is the mean of the preceding `window` observed
//! months of that district. Months without a row are not filled in, so a gap
//! shortens the history rather than adding zeros to it. The most recent month in
//! the data is treated as still in progress and left out; the last `holdout`
//! complete months form the validation span.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::SMAPE_EPSILON;
use crate::types::MonthlyAggregate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineSettings {
    pub window_months: usize,
    pub holdout_months: usize,
}

/// Error metrics over one span of months
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpanScore {
    pub months: usize,
    pub mae: f64,
    pub smape: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictBaseline {
    #[serde(rename = "BoroCD")]
    pub boro_cd: i32,
    /// Every month with a prediction
    pub all: SpanScore,
    /// Evaluable months before the holdout; absent when there are none
    pub train: Option<SpanScore>,
    /// Evaluable months inside the holdout; absent when there are none
    pub validation: Option<SpanScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineReport {
    pub settings: BaselineSettings,
    /// None when the input had fewer than two distinct months
    pub last_complete_month: Option<NaiveDate>,
    pub holdout_start: Option<NaiveDate>,
    pub districts: Vec<DistrictBaseline>,
    /// Mean validation MAE over districts that have a validation span
    pub avg_validation_mae: Option<f64>,
    pub avg_validation_smape: Option<f64>,
}

impl BaselineReport {
    pub fn districts_evaluated(&self) -> usize {
        self.districts.len()
    }
}

/// Mean absolute error and symmetric MAPE over (actual, predicted) pairs
pub fn score(pairs: &[(f64, f64)]) -> Option<SpanScore> {
    if pairs.is_empty() {
        return None;
    }
    let n = pairs.len() as f64;
    let mae = pairs.iter().map(|(y, p)| (y - p).abs()).sum::<f64>() / n;
    let smape = pairs
        .iter()
        .map(|(y, p)| 2.0 * (p - y).abs() / (p.abs() + y.abs() + SMAPE_EPSILON))
        .sum::<f64>()
        / n;
    Some(SpanScore {
        months: pairs.len(),
        mae,
        smape,
    })
}

/// Evaluate the rolling-mean baseline on monthly aggregates
pub fn evaluate_baseline(rows: &[MonthlyAggregate], settings: BaselineSettings) -> BaselineReport {
    let empty = BaselineReport {
        settings,
        last_complete_month: None,
        holdout_start: None,
        districts: Vec::new(),
        avg_validation_mae: None,
        avg_validation_smape: None,
    };

    let Some(latest) = rows.iter().map(|row| row.month).max() else {
        return empty;
    };
    let Some(last_complete) = latest.checked_sub_months(Months::new(1)) else {
        return empty;
    };
    let holdout_start = last_complete
        .checked_sub_months(Months::new(settings.holdout_months.saturating_sub(1) as u32))
        .unwrap_or(last_complete);

    let mut by_district: BTreeMap<i32, BTreeMap<NaiveDate, u64>> = BTreeMap::new();
    for row in rows.iter().filter(|row| row.month <= last_complete) {
        *by_district
            .entry(row.boro_cd)
            .or_default()
            .entry(row.month)
            .or_insert(0) += row.permit_count;
    }

    let mut districts = Vec::new();
    for (boro_cd, counts) in by_district {
        let series: Vec<(NaiveDate, f64)> = counts
            .into_iter()
            .map(|(month, count)| (month, count as f64))
            .collect();

        let window = settings.window_months;
        let mut all = Vec::new();
        let mut train = Vec::new();
        let mut validation = Vec::new();
        for i in window..series.len() {
            let predicted =
                series[i - window..i].iter().map(|(_, count)| count).sum::<f64>() / window as f64;
            let (month, actual) = series[i];
            all.push((actual, predicted));
            if month < holdout_start {
                train.push((actual, predicted));
            } else {
                validation.push((actual, predicted));
            }
        }

        let Some(all) = score(&all) else {
            continue;
        };
        districts.push(DistrictBaseline {
            boro_cd,
            all,
            train: score(&train),
            validation: score(&validation),
        });
    }

    let validated: Vec<SpanScore> = districts.iter().filter_map(|d| d.validation).collect();
    let average = |metric: fn(&SpanScore) -> f64| {
        if validated.is_empty() {
            None
        } else {
            Some(validated.iter().map(metric).sum::<f64>() / validated.len() as f64)
        }
    };

    BaselineReport {
        settings,
        last_complete_month: Some(last_complete),
        holdout_start: Some(holdout_start),
        avg_validation_mae: average(|s| s.mae),
        avg_validation_smape: average(|s| s.smape),
        districts,
    }
}
