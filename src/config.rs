use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants;
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::baseline::BaselineSettings;
use crate::pipeline::processing::overlap::OverlapWindow;
use crate::spatial::Crs;

/// Every tunable of a pipeline run. Missing sections and keys take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub overlap: OverlapConfig,
    pub districts: DistrictsConfig,
    pub aggregate: AggregateConfig,
    pub baseline: BaselineConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub historical_input: PathBuf,
    pub dob_now_input: PathBuf,
    pub districts_input: PathBuf,
    pub unified_output: PathBuf,
    pub enriched_output: PathBuf,
    pub monthly_output: PathBuf,
    pub modeling_output: PathBuf,
    pub baseline_output: PathBuf,
    pub manifest_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            historical_input: constants::DEFAULT_HISTORICAL_INPUT.into(),
            dob_now_input: constants::DEFAULT_DOB_NOW_INPUT.into(),
            districts_input: constants::DEFAULT_DISTRICTS_INPUT.into(),
            unified_output: constants::DEFAULT_UNIFIED_OUTPUT.into(),
            enriched_output: constants::DEFAULT_ENRICHED_OUTPUT.into(),
            monthly_output: constants::DEFAULT_MONTHLY_OUTPUT.into(),
            modeling_output: constants::DEFAULT_MODELING_OUTPUT.into(),
            baseline_output: constants::DEFAULT_BASELINE_OUTPUT.into(),
            manifest_dir: constants::DEFAULT_MANIFEST_DIR.into(),
        }
    }
}

/// Dates are quoted strings, e.g. `start = "2016-01-01"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            start: default_date(constants::DEFAULT_OVERLAP_START),
            end: default_date(constants::DEFAULT_OVERLAP_END),
        }
    }
}

fn default_date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistrictsConfig {
    /// Overrides the CRS declared by the districts file: an EPSG code such as
    /// "EPSG:2263", a `+proj=` string or WKT
    pub crs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub min_district_total: u64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            min_district_total: constants::DEFAULT_MIN_DISTRICT_TOTAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub window_months: usize,
    pub holdout_months: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            window_months: constants::DEFAULT_BASELINE_WINDOW_MONTHS,
            holdout_months: constants::DEFAULT_HOLDOUT_MONTHS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: constants::DEFAULT_LOG_DIR.into(),
            file_name: constants::DEFAULT_LOG_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Where to write the Prometheus text snapshot at exit; no snapshot when unset
    pub snapshot_path: Option<PathBuf>,
}

impl PipelineConfig {
    /// The configuration file to read: an explicit path, else `PERMITS_CONFIG`
    pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
        let from_env = std::env::var(constants::CONFIG_ENV_VAR).ok().map(PathBuf::from);
        explicit.map(Path::to_path_buf).or(from_env)
    }

    /// Load from [`PipelineConfig::config_path`], else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match Self::config_path(explicit) {
            Some(path) => Self::from_file(&path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.overlap.start > self.overlap.end {
            return Err(PipelineError::Config(format!(
                "overlap window starts {} after it ends {}",
                self.overlap.start, self.overlap.end
            )));
        }
        if self.baseline.window_months == 0 {
            return Err(PipelineError::Config(
                "baseline.window_months must be at least 1".to_string(),
            ));
        }
        if self.baseline.holdout_months == 0 {
            return Err(PipelineError::Config(
                "baseline.holdout_months must be at least 1".to_string(),
            ));
        }
        if self.logging.file_name.trim().is_empty() {
            return Err(PipelineError::Config("logging.file_name is empty".to_string()));
        }
        self.districts_crs()?;
        Ok(())
    }

    pub fn overlap_window(&self) -> OverlapWindow {
        OverlapWindow {
            start: self.overlap.start,
            end: self.overlap.end,
        }
    }

    pub fn baseline_settings(&self) -> BaselineSettings {
        BaselineSettings {
            window_months: self.baseline.window_months,
            holdout_months: self.baseline.holdout_months,
        }
    }

    pub fn districts_crs(&self) -> Result<Option<Crs>> {
        self.districts.crs.as_deref().map(Crs::parse).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.aggregate.min_district_total, 5000);
        assert_eq!(
            config.paths.unified_output,
            PathBuf::from("data/processed/permits_unified.parquet")
        );
        assert_eq!(config.overlap.start, NaiveDate::from_ymd_opt(2016, 1, 1).unwrap());
        assert_eq!(config.overlap.end, NaiveDate::from_ymd_opt(2019, 12, 31).unwrap());
        assert_eq!(config.baseline.window_months, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [aggregate]
            min_district_total = 100

            [paths]
            districts_input = "fixtures/districts.geojson"

            [districts]
            crs = "EPSG:2263"
            "#,
        )
        .unwrap();

        assert_eq!(config.aggregate.min_district_total, 100);
        assert_eq!(config.paths.districts_input, PathBuf::from("fixtures/districts.geojson"));
        assert_eq!(config.paths.dob_now_input, PathBuf::from("data/raw/dob_now.parquet"));
        assert_eq!(config.districts_crs().unwrap(), Some(Crs::from_epsg(2263).unwrap()));
        assert_eq!(config.logging.file_name, "permits.log");
    }

    #[test]
    fn test_inverted_overlap_window_is_rejected() {
        let err = PipelineConfig::from_toml(
            r#"
            [overlap]
            start = "2020-01-01"
            end = "2019-01-01"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_zero_baseline_window_is_rejected() {
        assert!(PipelineConfig::from_toml("[baseline]\nwindow_months = 0").is_err());
    }

    #[test]
    fn test_unknown_crs_is_rejected() {
        let err = PipelineConfig::from_toml("[districts]\ncrs = \"EPSG:99999\"").unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedCrs(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[metrics]\nsnapshot_path = \"metrics.prom\"").unwrap();
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.metrics.snapshot_path, Some(PathBuf::from("metrics.prom")));
    }

    #[test]
    fn test_explicit_path_wins() {
        let explicit = Path::new("configs/nightly.toml");
        assert_eq!(
            PipelineConfig::config_path(Some(explicit)),
            Some(PathBuf::from("configs/nightly.toml"))
        );
        let file = NamedTempFile::new().unwrap();
        assert!(PipelineConfig::load(Some(file.path())).is_ok());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/permits.toml")).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
