use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants;
use crate::error::{PipelineError, Result};

/// The upstream feed a permit row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSystem {
    DobHistorical,
    DobNow,
}

impl SourceSystem {
    pub const ALL: [SourceSystem; 2] = [SourceSystem::DobHistorical, SourceSystem::DobNow];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::DobHistorical => constants::DOB_HISTORICAL,
            SourceSystem::DobNow => constants::DOB_NOW,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            constants::DOB_HISTORICAL => Some(SourceSystem::DobHistorical),
            constants::DOB_NOW => Some(SourceSystem::DobNow),
            _ => None,
        }
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a canonical field is coerced from raw text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Numeric,
}

/// The 20 canonical permit fields, in persisted order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalField {
    SourceSystem,
    PermitId,
    IssuedDate,
    FilingDate,
    ExpirationDate,
    PermitStatus,
    JobType,
    WorkType,
    Borough,
    Bin,
    Block,
    Lot,
    ZipCode,
    Latitude,
    Longitude,
    CommunityBoard,
    CouncilDistrict,
    CensusTract,
    Nta,
    EstimatedJobCost,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 20] = [
        CanonicalField::SourceSystem,
        CanonicalField::PermitId,
        CanonicalField::IssuedDate,
        CanonicalField::FilingDate,
        CanonicalField::ExpirationDate,
        CanonicalField::PermitStatus,
        CanonicalField::JobType,
        CanonicalField::WorkType,
        CanonicalField::Borough,
        CanonicalField::Bin,
        CanonicalField::Block,
        CanonicalField::Lot,
        CanonicalField::ZipCode,
        CanonicalField::Latitude,
        CanonicalField::Longitude,
        CanonicalField::CommunityBoard,
        CanonicalField::CouncilDistrict,
        CanonicalField::CensusTract,
        CanonicalField::Nta,
        CanonicalField::EstimatedJobCost,
    ];

    pub fn name(&self) -> &'static str {
        constants::CANONICAL_COLUMNS[*self as usize]
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            CanonicalField::IssuedDate
            | CanonicalField::FilingDate
            | CanonicalField::ExpirationDate => FieldKind::Date,
            CanonicalField::Latitude
            | CanonicalField::Longitude
            | CanonicalField::CouncilDistrict
            | CanonicalField::EstimatedJobCost => FieldKind::Numeric,
            _ => FieldKind::Text,
        }
    }
}

/// One permit in the unified schema shared by both sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPermit {
    pub source_system: SourceSystem,
    pub permit_id: Option<String>,
    pub issued_date: Option<NaiveDate>,
    pub filing_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub permit_status: Option<String>,
    pub job_type: Option<String>,
    pub work_type: Option<String>,
    pub borough: Option<String>,
    pub bin: Option<String>,
    pub block: Option<String>,
    pub lot: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub community_board: Option<String>,
    pub council_district: Option<f64>,
    pub census_tract: Option<String>,
    pub nta: Option<String>,
    pub estimated_job_cost: Option<f64>,
}

impl CanonicalPermit {
    /// A row with every field missing except its source tag
    pub fn empty(source_system: SourceSystem) -> Self {
        Self {
            source_system,
            permit_id: None,
            issued_date: None,
            filing_date: None,
            expiration_date: None,
            permit_status: None,
            job_type: None,
            work_type: None,
            borough: None,
            bin: None,
            block: None,
            lot: None,
            zip_code: None,
            latitude: None,
            longitude: None,
            community_board: None,
            council_district: None,
            census_tract: None,
            nta: None,
            estimated_job_cost: None,
        }
    }

    pub fn text(&self, field: CanonicalField) -> Option<&str> {
        let value = match field {
            CanonicalField::PermitId => &self.permit_id,
            CanonicalField::PermitStatus => &self.permit_status,
            CanonicalField::JobType => &self.job_type,
            CanonicalField::WorkType => &self.work_type,
            CanonicalField::Borough => &self.borough,
            CanonicalField::Bin => &self.bin,
            CanonicalField::Block => &self.block,
            CanonicalField::Lot => &self.lot,
            CanonicalField::ZipCode => &self.zip_code,
            CanonicalField::CommunityBoard => &self.community_board,
            CanonicalField::CensusTract => &self.census_tract,
            CanonicalField::Nta => &self.nta,
            CanonicalField::SourceSystem => return Some(self.source_system.as_str()),
            _ => return None,
        };
        value.as_deref()
    }

    pub fn date(&self, field: CanonicalField) -> Option<NaiveDate> {
        match field {
            CanonicalField::IssuedDate => self.issued_date,
            CanonicalField::FilingDate => self.filing_date,
            CanonicalField::ExpirationDate => self.expiration_date,
            _ => None,
        }
    }

    pub fn numeric(&self, field: CanonicalField) -> Option<f64> {
        match field {
            CanonicalField::Latitude => self.latitude,
            CanonicalField::Longitude => self.longitude,
            CanonicalField::CouncilDistrict => self.council_district,
            CanonicalField::EstimatedJobCost => self.estimated_job_cost,
            _ => None,
        }
    }

    pub fn set_text(&mut self, field: CanonicalField, value: Option<String>) {
        let slot = match field {
            CanonicalField::PermitId => &mut self.permit_id,
            CanonicalField::PermitStatus => &mut self.permit_status,
            CanonicalField::JobType => &mut self.job_type,
            CanonicalField::WorkType => &mut self.work_type,
            CanonicalField::Borough => &mut self.borough,
            CanonicalField::Bin => &mut self.bin,
            CanonicalField::Block => &mut self.block,
            CanonicalField::Lot => &mut self.lot,
            CanonicalField::ZipCode => &mut self.zip_code,
            CanonicalField::CommunityBoard => &mut self.community_board,
            CanonicalField::CensusTract => &mut self.census_tract,
            CanonicalField::Nta => &mut self.nta,
            _ => return,
        };
        *slot = value;
    }

    pub fn set_date(&mut self, field: CanonicalField, value: Option<NaiveDate>) {
        match field {
            CanonicalField::IssuedDate => self.issued_date = value,
            CanonicalField::FilingDate => self.filing_date = value,
            CanonicalField::ExpirationDate => self.expiration_date = value,
            _ => {}
        }
    }

    pub fn set_numeric(&mut self, field: CanonicalField, value: Option<f64>) {
        match field {
            CanonicalField::Latitude => self.latitude = value,
            CanonicalField::Longitude => self.longitude = value,
            CanonicalField::CouncilDistrict => self.council_district = value,
            CanonicalField::EstimatedJobCost => self.estimated_job_cost = value,
            _ => {}
        }
    }

    /// Both coordinates, when present
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// A canonical permit with the community district it falls in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoEnrichedPermit {
    pub permit: CanonicalPermit,
    /// Null when the permit has no coordinates or lies outside every district
    pub boro_cd: Option<i32>,
}

/// Permit count for one district in one calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthlyAggregate {
    pub boro_cd: i32,
    /// First day of the month
    pub month: NaiveDate,
    pub permit_count: u64,
}

/// Raw rows from one upstream feed, stored column-wise as nullable text
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub len: usize,
    pub columns: BTreeMap<String, Vec<Option<String>>>,
    /// Where the table was read from, for error messages
    pub origin: String,
}

impl RawTable {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            len: 0,
            columns: BTreeMap::new(),
            origin: origin.into(),
        }
    }

    /// Add a column; every column must have the same length
    pub fn with_column(mut self, name: &str, values: Vec<Option<String>>) -> Result<Self> {
        if !self.columns.is_empty() && values.len() != self.len {
            return Err(PipelineError::Config(format!(
                "column '{}' has {} rows, expected {}",
                name,
                values.len(),
                self.len
            )));
        }
        self.len = values.len();
        self.columns.insert(name.to_string(), values);
        Ok(self)
    }

    /// Build a table from row-shaped fixtures, filling absent cells with nulls
    pub fn from_rows(origin: &str, columns: &[&str], rows: &[Vec<(&str, &str)>]) -> Self {
        let mut table = RawTable::new(origin);
        table.len = rows.len();
        for column in columns {
            let values = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .find(|(key, _)| key == column)
                        .map(|(_, value)| value.to_string())
                })
                .collect();
            table.columns.insert(column.to_string(), values);
        }
        table
    }

    pub fn column(&self, name: &str) -> Option<&[Option<String>]> {
        self.columns.get(name).map(|values| values.as_slice())
    }
}
