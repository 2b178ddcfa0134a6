use std::collections::BTreeMap;

use crate::error::{PipelineError, Result};
use crate::pipeline::processing::dates::normalize_dates;
use crate::types::{CanonicalField, CanonicalPermit, FieldKind, RawTable, SourceSystem};

pub mod normalizers;
pub mod registry;

pub use registry::NormalizationRegistry;

/// Where a canonical field's value comes from in one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// Copied from a raw column, coerced by the target field's kind
    Column(&'static str),
    /// The source has no such concept; the field is always null
    Missing,
}

/// One entry in a source's field-mapping table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub target: CanonicalField,
    pub source: FieldSource,
}

impl FieldMapping {
    pub const fn column(target: CanonicalField, column: &'static str) -> Self {
        Self {
            target,
            source: FieldSource::Column(column),
        }
    }

    pub const fn missing(target: CanonicalField) -> Self {
        Self {
            target,
            source: FieldSource::Missing,
        }
    }
}

/// A translation from one upstream feed's column layout into canonical permits
pub trait SourceNormalizer: Send + Sync {
    /// The fixed tag written into every row this normalizer produces
    fn source_system(&self) -> SourceSystem;

    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Mapping for every canonical field except `source_system`
    fn field_mappings(&self) -> &'static [FieldMapping];

    /// Raw columns that must be present when reading this source
    fn required_columns(&self) -> Vec<&'static str> {
        self.field_mappings()
            .iter()
            .filter_map(|mapping| match mapping.source {
                FieldSource::Column(column) => Some(column),
                FieldSource::Missing => None,
            })
            .collect()
    }

    /// Translate a whole raw table into canonical rows
    fn normalize(&self, table: &RawTable) -> Result<NormalizedBatch> {
        apply_mappings(self.source_system(), self.field_mappings(), table)
    }
}

/// Canonical rows from one source plus counts of cells that degraded to missing
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub permits: Vec<CanonicalPermit>,
    /// Non-empty raw cells that failed coercion, per canonical field
    pub degraded_cells: BTreeMap<CanonicalField, usize>,
}

impl NormalizedBatch {
    pub fn total_degraded(&self) -> usize {
        self.degraded_cells.values().sum()
    }
}

/// Coerce raw text to a finite float; anything else is missing
pub fn to_numeric(raw: &str) -> Option<f64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Pass text through, turning empty or whitespace-only cells into explicit nulls
pub fn to_text(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Apply a field-mapping table to a raw table.
///
/// Every mapped column must exist; an absent column means the upstream contract
/// is broken and the whole batch is rejected. Individual cells that fail coercion
/// become missing and are counted.
pub fn apply_mappings(
    source_system: SourceSystem,
    mappings: &[FieldMapping],
    table: &RawTable,
) -> Result<NormalizedBatch> {
    let mut permits = vec![CanonicalPermit::empty(source_system); table.len];
    let mut degraded_cells = BTreeMap::new();

    for mapping in mappings {
        let column = match mapping.source {
            FieldSource::Missing => continue,
            FieldSource::Column(name) => {
                table
                    .column(name)
                    .ok_or_else(|| PipelineError::MissingColumn {
                        source_system: source_system.to_string(),
                        column: name.to_string(),
                        path: table.origin.clone(),
                    })?
            }
        };

        let target = mapping.target;
        let mut degraded = 0usize;
        match target.kind() {
            FieldKind::Text => {
                for (permit, cell) in permits.iter_mut().zip(column) {
                    permit.set_text(target, cell.as_deref().and_then(to_text));
                }
            }
            FieldKind::Date => {
                for ((permit, cell), parsed) in
                    permits.iter_mut().zip(column).zip(normalize_dates(column))
                {
                    if parsed.is_none() && has_content(cell) {
                        degraded += 1;
                    }
                    permit.set_date(target, parsed);
                }
            }
            FieldKind::Numeric => {
                for (permit, cell) in permits.iter_mut().zip(column) {
                    let parsed = cell.as_deref().and_then(to_numeric);
                    if parsed.is_none() && has_content(cell) {
                        degraded += 1;
                    }
                    permit.set_numeric(target, parsed);
                }
            }
        }

        if degraded > 0 {
            degraded_cells.insert(target, degraded);
        }
    }

    Ok(NormalizedBatch {
        permits,
        degraded_cells,
    })
}

fn has_content(cell: &Option<String>) -> bool {
    cell.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPINGS: &[FieldMapping] = &[
        FieldMapping::column(CanonicalField::PermitId, "id"),
        FieldMapping::column(CanonicalField::IssuedDate, "issued"),
        FieldMapping::column(CanonicalField::Latitude, "lat"),
        FieldMapping::missing(CanonicalField::EstimatedJobCost),
    ];

    #[test]
    fn test_to_numeric() {
        assert_eq!(to_numeric("40.7128"), Some(40.7128));
        assert_eq!(to_numeric(" -73.5 "), Some(-73.5));
        assert_eq!(to_numeric("12"), Some(12.0));
        assert_eq!(to_numeric("abc"), None);
        assert_eq!(to_numeric(""), None);
        assert_eq!(to_numeric("NaN"), None);
        assert_eq!(to_numeric("inf"), None);
    }

    #[test]
    fn test_apply_mappings_degrades_bad_cells() {
        let table = RawTable::from_rows(
            "fixture",
            &["id", "issued", "lat"],
            &[
                vec![("id", "a"), ("issued", "01/02/2020"), ("lat", "40.1")],
                vec![("id", "b"), ("issued", "nope"), ("lat", "north")],
                vec![("id", " "), ("lat", "")],
            ],
        );

        let batch = apply_mappings(SourceSystem::DobNow, MAPPINGS, &table).unwrap();
        assert_eq!(batch.permits.len(), 3);
        assert_eq!(batch.permits[0].permit_id.as_deref(), Some("a"));
        assert_eq!(batch.permits[0].latitude, Some(40.1));
        assert_eq!(batch.permits[1].issued_date, None);
        assert_eq!(batch.permits[1].latitude, None);
        // Blank text is an explicit null, not an empty string
        assert_eq!(batch.permits[2].permit_id, None);
        assert!(batch.permits.iter().all(|p| p.source_system == SourceSystem::DobNow));

        assert_eq!(batch.degraded_cells.get(&CanonicalField::IssuedDate), Some(&1));
        assert_eq!(batch.degraded_cells.get(&CanonicalField::Latitude), Some(&1));
        assert_eq!(batch.total_degraded(), 2);
    }

    #[test]
    fn test_apply_mappings_missing_column_is_fatal() {
        let table = RawTable::from_rows("fixture.parquet", &["id", "issued"], &[vec![("id", "a")]]);
        let err = apply_mappings(SourceSystem::DobHistorical, MAPPINGS, &table).unwrap_err();
        match err {
            PipelineError::MissingColumn { column, path, .. } => {
                assert_eq!(column, "lat");
                assert_eq!(path, "fixture.parquet");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
