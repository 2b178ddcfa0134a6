// Pipeline processing: normalization, diagnostics, spatial join and aggregation

pub mod aggregate;
pub mod baseline;
pub mod dates;
pub mod enrich;
pub mod normalize;
pub mod overlap;
