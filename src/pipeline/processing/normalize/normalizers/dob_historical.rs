use super::super::{FieldMapping, SourceNormalizer};
use crate::types::{CanonicalField, SourceSystem};

/// Column layout of the DOB Permit Issuance export
const FIELD_MAPPINGS: &[FieldMapping] = &[
    FieldMapping::column(CanonicalField::PermitId, "permit_si_no"),
    FieldMapping::column(CanonicalField::IssuedDate, "issuance_date"),
    FieldMapping::column(CanonicalField::FilingDate, "filing_date"),
    FieldMapping::column(CanonicalField::ExpirationDate, "expiration_date"),
    FieldMapping::column(CanonicalField::PermitStatus, "permit_status"),
    FieldMapping::column(CanonicalField::JobType, "job_type"),
    FieldMapping::column(CanonicalField::WorkType, "work_type"),
    FieldMapping::column(CanonicalField::Borough, "borough"),
    FieldMapping::column(CanonicalField::Bin, "bin__"),
    FieldMapping::column(CanonicalField::Block, "block"),
    FieldMapping::column(CanonicalField::Lot, "lot"),
    FieldMapping::column(CanonicalField::ZipCode, "zip_code"),
    FieldMapping::column(CanonicalField::Latitude, "gis_latitude"),
    FieldMapping::column(CanonicalField::Longitude, "gis_longitude"),
    FieldMapping::column(CanonicalField::CommunityBoard, "community_board"),
    FieldMapping::column(CanonicalField::CouncilDistrict, "gis_council_district"),
    FieldMapping::column(CanonicalField::CensusTract, "gis_census_tract"),
    FieldMapping::column(CanonicalField::Nta, "gis_nta_name"),
    // The historical feed never carried cost estimates
    FieldMapping::missing(CanonicalField::EstimatedJobCost),
];

/// Normalizer for the legacy DOB permit issuance feed
pub struct DobHistoricalNormalizer;

impl DobHistoricalNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl SourceNormalizer for DobHistoricalNormalizer {
    fn source_system(&self) -> SourceSystem {
        SourceSystem::DobHistorical
    }

    fn name(&self) -> &str {
        "DOB Permit Issuance Normalizer"
    }

    fn field_mappings(&self) -> &'static [FieldMapping] {
        FIELD_MAPPINGS
    }
}

impl Default for DobHistoricalNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawTable;
    use chrono::NaiveDate;

    fn raw_table(rows: &[Vec<(&str, &str)>]) -> RawTable {
        let normalizer = DobHistoricalNormalizer::new();
        RawTable::from_rows("dob_historical.parquet", &normalizer.required_columns(), rows)
    }

    #[test]
    fn test_maps_permit_id_and_issuance_date() {
        let table = raw_table(&[vec![
            ("permit_si_no", "12345"),
            ("issuance_date", "01/15/2018"),
        ]]);

        let batch = DobHistoricalNormalizer::new().normalize(&table).unwrap();
        let permit = &batch.permits[0];
        assert_eq!(permit.source_system, SourceSystem::DobHistorical);
        assert_eq!(permit.source_system.as_str(), "dob_historical");
        assert_eq!(permit.permit_id.as_deref(), Some("12345"));
        assert_eq!(permit.issued_date, NaiveDate::from_ymd_opt(2018, 1, 15));
        assert_eq!(permit.estimated_job_cost, None);
    }

    #[test]
    fn test_maps_gis_columns() {
        let table = raw_table(&[vec![
            ("permit_si_no", "1"),
            ("bin__", "1001234"),
            ("gis_latitude", "40.71"),
            ("gis_longitude", "-74.00"),
            ("gis_council_district", "1"),
            ("gis_census_tract", "31"),
            ("gis_nta_name", "Battery Park City-Lower Manhattan"),
            ("filing_date", "2018-01-02"),
            ("expiration_date", "01/15/2019"),
        ]]);

        let batch = DobHistoricalNormalizer::new().normalize(&table).unwrap();
        let permit = &batch.permits[0];
        assert_eq!(permit.bin.as_deref(), Some("1001234"));
        assert_eq!(permit.coordinates(), Some((40.71, -74.0)));
        assert_eq!(permit.council_district, Some(1.0));
        assert_eq!(permit.census_tract.as_deref(), Some("31"));
        assert_eq!(permit.nta.as_deref(), Some("Battery Park City-Lower Manhattan"));
        assert_eq!(permit.filing_date, NaiveDate::from_ymd_opt(2018, 1, 2));
        assert_eq!(permit.expiration_date, NaiveDate::from_ymd_opt(2019, 1, 15));
    }

    #[test]
    fn test_requires_every_mapped_column() {
        let columns = DobHistoricalNormalizer::new().required_columns();
        assert_eq!(columns.len(), 18);
        assert!(columns.contains(&"bin__"));
        assert!(!columns.contains(&"estimated_job_costs"));
    }
}
