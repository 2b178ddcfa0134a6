/// Source system constants to ensure consistency across the codebase
/// These literals are written into the `source_system` column of every canonical row

// Source system tags (persisted)
pub const DOB_HISTORICAL: &str = "dob_historical";
pub const DOB_NOW: &str = "dob_now";

// Canonical column names, in persisted order
pub const CANONICAL_COLUMNS: [&str; 20] = [
    "source_system",
    "permit_id",
    "issued_date",
    "filing_date",
    "expiration_date",
    "permit_status",
    "job_type",
    "work_type",
    "borough",
    "bin",
    "block",
    "lot",
    "zip_code",
    "latitude",
    "longitude",
    "community_board",
    "council_district",
    "census_tract",
    "nta",
    "estimated_job_cost",
];

// District and aggregate columns
pub const BORO_CD_COLUMN: &str = "BoroCD";
pub const MONTH_COLUMN: &str = "month";
pub const PERMIT_COUNT_COLUMN: &str = "permit_count";

/// Districts whose total permits over the observed history fall below this are
/// left out of the modeling aggregate
pub const DEFAULT_MIN_DISTRICT_TOTAL: u64 = 5000;

// Overlap window used for the cross-source collision diagnostic
pub const DEFAULT_OVERLAP_START: &str = "2016-01-01";
pub const DEFAULT_OVERLAP_END: &str = "2019-12-31";

/// Coordinates are compared at this many decimal places when looking for cross-source collisions
pub const OVERLAP_COORD_DECIMALS: i32 = 5;

// Baseline evaluation
pub const DEFAULT_BASELINE_WINDOW_MONTHS: usize = 12;
pub const DEFAULT_HOLDOUT_MONTHS: usize = 12;
pub const SMAPE_EPSILON: f64 = 1e-8;

// Default file locations
pub const DEFAULT_HISTORICAL_INPUT: &str = "data/raw/dob_historical.parquet";
pub const DEFAULT_DOB_NOW_INPUT: &str = "data/raw/dob_now.parquet";
pub const DEFAULT_DISTRICTS_INPUT: &str = "data/raw/nycd_25d/nycd.shp";
pub const DEFAULT_UNIFIED_OUTPUT: &str = "data/processed/permits_unified.parquet";
pub const DEFAULT_ENRICHED_OUTPUT: &str = "data/processed/permits_unified_with_district.parquet";
pub const DEFAULT_MONTHLY_OUTPUT: &str = "data/processed/monthly_permits_by_district.parquet";
pub const DEFAULT_MODELING_OUTPUT: &str =
    "data/processed/monthly_permits_by_district_modeling.parquet";
pub const DEFAULT_BASELINE_OUTPUT: &str = "data/processed/baseline_report.json";
pub const DEFAULT_MANIFEST_DIR: &str = "data/processed/manifests";

// Logging
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "permits.log";

// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PERMITS_CONFIG";
