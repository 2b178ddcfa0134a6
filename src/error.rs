use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Missing required column '{column}' for source {source_system} in {path}")]
    MissingColumn {
        source_system: String,
        column: String,
        path: String,
    },

    #[error("Missing input file: {0}")]
    MissingInput(String),

    #[error("Invalid district polygons: {0}")]
    InvalidDistricts(String),

    #[error("Unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
