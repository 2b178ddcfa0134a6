//! Pipeline metrics recorded through the `metrics` facade.
//!
//! A Prometheus recorder is installed once at startup; stages record through
//! the per-stage helper modules below. Without a recorder every call is a no-op.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Unify
    UnifyRowsRead,
    UnifyRowsUnified,
    UnifyCellsDegraded,

    // Overlap
    OverlapRowsInWindow,
    OverlapCrossSystemCollisions,
    OverlapRecordsInCollisions,

    // Spatial join
    EnrichPolygons,
    EnrichMatched,
    EnrichUnmatched,
    EnrichMissingCoordinates,
    EnrichMultiMatch,

    // Aggregate
    AggregateRows,
    AggregateModelingRows,
    AggregateDistrictsDropped,

    // Baseline
    BaselineDistrictsEvaluated,
    BaselineValidationMae,
    BaselineValidationSmape,

    // All stages
    StageDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::UnifyRowsRead => "permits_unify_rows_read_total",
            MetricName::UnifyRowsUnified => "permits_unify_rows_unified_total",
            MetricName::UnifyCellsDegraded => "permits_unify_cells_degraded_total",

            MetricName::OverlapRowsInWindow => "permits_overlap_rows_in_window",
            MetricName::OverlapCrossSystemCollisions => "permits_overlap_cross_system_collisions",
            MetricName::OverlapRecordsInCollisions => "permits_overlap_records_in_collisions",

            MetricName::EnrichPolygons => "permits_enrich_polygons",
            MetricName::EnrichMatched => "permits_enrich_matched_total",
            MetricName::EnrichUnmatched => "permits_enrich_unmatched_total",
            MetricName::EnrichMissingCoordinates => "permits_enrich_missing_coordinates_total",
            MetricName::EnrichMultiMatch => "permits_enrich_multi_match_total",

            MetricName::AggregateRows => "permits_aggregate_rows",
            MetricName::AggregateModelingRows => "permits_aggregate_modeling_rows",
            MetricName::AggregateDistrictsDropped => "permits_aggregate_districts_dropped",

            MetricName::BaselineDistrictsEvaluated => "permits_baseline_districts_evaluated",
            MetricName::BaselineValidationMae => "permits_baseline_validation_mae",
            MetricName::BaselineValidationSmape => "permits_baseline_validation_smape",

            MetricName::StageDuration => "permits_stage_duration_seconds",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            UnifyRowsRead,
            UnifyRowsUnified,
            UnifyCellsDegraded,
            OverlapRowsInWindow,
            OverlapCrossSystemCollisions,
            OverlapRecordsInCollisions,
            EnrichPolygons,
            EnrichMatched,
            EnrichUnmatched,
            EnrichMissingCoordinates,
            EnrichMultiMatch,
            AggregateRows,
            AggregateModelingRows,
            AggregateDistrictsDropped,
            BaselineDistrictsEvaluated,
            BaselineValidationMae,
            BaselineValidationSmape,
            StageDuration,
        ]
        .into_iter()
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it again is a no-op.
pub fn init() -> Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| {
            PipelineError::Config(format!("Failed to install Prometheus recorder: {}", e))
        })?;
    let _ = METRICS_HANDLE.set(handle);
    info!("Metrics system initialized");
    Ok(())
}

/// Current metrics in Prometheus text format, if a recorder is installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

/// Write the rendered metrics to `path`
pub fn write_snapshot(path: &Path) -> Result<()> {
    let Some(text) = render() else {
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    info!("Metrics snapshot written to {}", path.display());
    Ok(())
}

/// Record how long a stage took
pub fn stage_duration(stage: &'static str, secs: f64) {
    ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage).record(secs);
}

// ============================================================================
// Unify Metrics
// ============================================================================

pub mod unify {
    use super::MetricName;

    pub fn rows_read(source: &str, count: usize) {
        ::metrics::counter!(
            MetricName::UnifyRowsRead.as_str(),
            "source_system" => source.to_string()
        )
        .increment(count as u64);
    }

    pub fn rows_unified(count: usize) {
        ::metrics::counter!(MetricName::UnifyRowsUnified.as_str()).increment(count as u64);
    }

    pub fn cells_degraded(source: &str, field: &str, count: usize) {
        ::metrics::counter!(MetricName::UnifyCellsDegraded.as_str(),
            "source_system" => source.to_string(),
            "field" => field.to_string()
        )
        .increment(count as u64);
    }
}

// ============================================================================
// Overlap Metrics
// ============================================================================

pub mod overlap {
    use super::MetricName;
    use crate::pipeline::processing::overlap::OverlapReport;

    pub fn report(report: &OverlapReport) {
        ::metrics::gauge!(MetricName::OverlapRowsInWindow.as_str())
            .set(report.rows_in_window as f64);
        ::metrics::gauge!(MetricName::OverlapCrossSystemCollisions.as_str())
            .set(report.cross_system_collisions as f64);
        ::metrics::gauge!(MetricName::OverlapRecordsInCollisions.as_str())
            .set(report.records_in_collisions as f64);
    }
}

// ============================================================================
// Spatial Join Metrics
// ============================================================================

pub mod enrich {
    use super::MetricName;
    use crate::pipeline::processing::enrich::EnrichmentReport;

    pub fn report(report: &EnrichmentReport) {
        ::metrics::gauge!(MetricName::EnrichPolygons.as_str()).set(report.polygons as f64);
        ::metrics::counter!(MetricName::EnrichMatched.as_str()).increment(report.matched() as u64);
        ::metrics::counter!(MetricName::EnrichUnmatched.as_str())
            .increment(report.outside_all as u64);
        ::metrics::counter!(MetricName::EnrichMissingCoordinates.as_str())
            .increment(report.without_coordinates as u64);
        ::metrics::counter!(MetricName::EnrichMultiMatch.as_str())
            .increment(report.multi_match as u64);
    }
}

// ============================================================================
// Aggregate Metrics
// ============================================================================

pub mod aggregate {
    use super::MetricName;

    pub fn rows(full: usize, modeling: usize) {
        ::metrics::gauge!(MetricName::AggregateRows.as_str()).set(full as f64);
        ::metrics::gauge!(MetricName::AggregateModelingRows.as_str()).set(modeling as f64);
    }

    pub fn districts_dropped(count: usize) {
        ::metrics::gauge!(MetricName::AggregateDistrictsDropped.as_str()).set(count as f64);
    }
}

// ============================================================================
// Baseline Metrics
// ============================================================================

pub mod baseline {
    use super::MetricName;
    use crate::pipeline::processing::baseline::BaselineReport;

    pub fn report(report: &BaselineReport) {
        ::metrics::gauge!(MetricName::BaselineDistrictsEvaluated.as_str())
            .set(report.districts_evaluated() as f64);
        if let Some(mae) = report.avg_validation_mae {
            ::metrics::gauge!(MetricName::BaselineValidationMae.as_str()).set(mae);
        }
        if let Some(smape) = report.avg_validation_smape {
            ::metrics::gauge!(MetricName::BaselineValidationSmape.as_str()).set(smape);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_are_unique_and_prefixed() {
        let names: Vec<&str> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
        assert!(names.iter().all(|n| n.starts_with("permits_")));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        unify::rows_read("dob_now", 3);
        stage_duration("unify", 0.5);
        assert!(render().is_none());
        assert!(write_snapshot(Path::new("/nonexistent/dir/metrics.prom")).is_ok());
    }
}
