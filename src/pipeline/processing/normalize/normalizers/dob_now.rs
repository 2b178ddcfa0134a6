use super::super::{FieldMapping, SourceNormalizer};
use crate::types::{CanonicalField, SourceSystem};

/// Column layout of the DOB NOW: Build approved permits export
const FIELD_MAPPINGS: &[FieldMapping] = &[
    FieldMapping::column(CanonicalField::PermitId, "job_filing_number"),
    FieldMapping::column(CanonicalField::IssuedDate, "issued_date"),
    FieldMapping::missing(CanonicalField::FilingDate),
    FieldMapping::column(CanonicalField::ExpirationDate, "expired_date"),
    FieldMapping::column(CanonicalField::PermitStatus, "permit_status"),
    FieldMapping::missing(CanonicalField::JobType),
    FieldMapping::column(CanonicalField::WorkType, "work_type"),
    FieldMapping::column(CanonicalField::Borough, "borough"),
    FieldMapping::column(CanonicalField::Bin, "bin"),
    FieldMapping::column(CanonicalField::Block, "block"),
    FieldMapping::column(CanonicalField::Lot, "lot"),
    FieldMapping::column(CanonicalField::ZipCode, "zip_code"),
    FieldMapping::column(CanonicalField::Latitude, "latitude"),
    FieldMapping::column(CanonicalField::Longitude, "longitude"),
    FieldMapping::column(CanonicalField::CommunityBoard, "community_board"),
    FieldMapping::column(CanonicalField::CouncilDistrict, "council_district"),
    FieldMapping::column(CanonicalField::CensusTract, "census_tract"),
    FieldMapping::column(CanonicalField::Nta, "nta"),
    FieldMapping::column(CanonicalField::EstimatedJobCost, "estimated_job_costs"),
];

/// Normalizer for the DOB NOW approved permits feed
pub struct DobNowNormalizer;

impl DobNowNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl SourceNormalizer for DobNowNormalizer {
    fn source_system(&self) -> SourceSystem {
        SourceSystem::DobNow
    }

    fn name(&self) -> &str {
        "DOB NOW Build Normalizer"
    }

    fn field_mappings(&self) -> &'static [FieldMapping] {
        FIELD_MAPPINGS
    }
}

impl Default for DobNowNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
