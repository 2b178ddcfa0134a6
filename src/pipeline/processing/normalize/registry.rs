use std::collections::HashMap;

use super::normalizers::{DobHistoricalNormalizer, DobNowNormalizer};
use super::SourceNormalizer;
use crate::error::{PipelineError, Result};
use crate::types::SourceSystem;

/// Registry for source-specific normalization strategies
pub struct NormalizationRegistry {
    normalizers: HashMap<SourceSystem, Box<dyn SourceNormalizer>>,
}

impl NormalizationRegistry {
    /// Create a new normalization registry with both permit feeds registered
    pub fn new() -> Self {
        let mut normalizers: HashMap<SourceSystem, Box<dyn SourceNormalizer>> = HashMap::new();

        normalizers.insert(
            SourceSystem::DobHistorical,
            Box::new(DobHistoricalNormalizer::new()),
        );
        normalizers.insert(SourceSystem::DobNow, Box::new(DobNowNormalizer::new()));

        Self { normalizers }
    }

    /// The normalizer registered for a source
    pub fn normalizer(&self, source: SourceSystem) -> Result<&dyn SourceNormalizer> {
        self.normalizers
            .get(&source)
            .map(|n| n.as_ref())
            .ok_or_else(|| {
                PipelineError::Config(format!("No normalizer registered for source: {}", source))
            })
    }
}

impl Default for NormalizationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
