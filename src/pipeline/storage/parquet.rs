use arrow::array::{
    Array, ArrayRef, AsArray, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::traits::{sha256_hex, StoredOutput, TableStore};
use crate::constants::{BORO_CD_COLUMN, MONTH_COLUMN, PERMIT_COUNT_COLUMN};
use crate::error::{PipelineError, Result};
use crate::types::{
    CanonicalField, CanonicalPermit, FieldKind, GeoEnrichedPermit, MonthlyAggregate, RawTable,
    SourceSystem,
};

const MICROS_PER_DAY: i64 = 86_400_000_000;
const UNIFIED_TABLE: &str = "permits_unified";
const ENRICHED_TABLE: &str = "permits_with_district";
const AGGREGATE_TABLE: &str = "monthly_permits";

/// Parquet files on the local filesystem
#[derive(Debug, Clone, Default)]
pub struct ParquetTableStore;

impl ParquetTableStore {
    pub fn new() -> Self {
        Self
    }
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build()
}

fn canonical_fields() -> Vec<Field> {
    CanonicalField::ALL
        .iter()
        .map(|field| {
            let data_type = match field.kind() {
                FieldKind::Text => DataType::Utf8,
                FieldKind::Date => DataType::Date32,
                FieldKind::Numeric => DataType::Float64,
            };
            Field::new(field.name(), data_type, *field != CanonicalField::SourceSystem)
        })
        .collect()
}

/// 20 canonical columns, plus a nullable `BoroCD` when `with_district` is set
pub fn permit_schema(with_district: bool) -> SchemaRef {
    let mut fields = canonical_fields();
    if with_district {
        fields.push(Field::new(BORO_CD_COLUMN, DataType::Int32, true));
    }
    Arc::new(Schema::new(fields))
}

pub fn aggregate_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(BORO_CD_COLUMN, DataType::Int32, false),
        Field::new(
            MONTH_COLUMN,
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new(PERMIT_COUNT_COLUMN, DataType::Int64, false),
    ]))
}

fn permit_columns(permits: &[&CanonicalPermit]) -> Vec<ArrayRef> {
    CanonicalField::ALL
        .iter()
        .map(|&field| -> ArrayRef {
            match field.kind() {
                FieldKind::Text => Arc::new(StringArray::from(
                    permits.iter().map(|p| p.text(field)).collect::<Vec<_>>(),
                )),
                FieldKind::Date => Arc::new(Date32Array::from(
                    permits
                        .iter()
                        .map(|p| p.date(field).map(Date32Type::from_naive_date))
                        .collect::<Vec<_>>(),
                )),
                FieldKind::Numeric => Arc::new(Float64Array::from(
                    permits.iter().map(|p| p.numeric(field)).collect::<Vec<_>>(),
                )),
            }
        })
        .collect()
}

pub fn permits_to_batch(permits: &[CanonicalPermit]) -> Result<RecordBatch> {
    let refs: Vec<&CanonicalPermit> = permits.iter().collect();
    Ok(RecordBatch::try_new(permit_schema(false), permit_columns(&refs))?)
}

pub fn enriched_to_batch(permits: &[GeoEnrichedPermit]) -> Result<RecordBatch> {
    let refs: Vec<&CanonicalPermit> = permits.iter().map(|e| &e.permit).collect();
    let mut columns = permit_columns(&refs);
    columns.push(Arc::new(Int32Array::from(
        permits.iter().map(|e| e.boro_cd).collect::<Vec<_>>(),
    )));
    Ok(RecordBatch::try_new(permit_schema(true), columns)?)
}

pub fn aggregates_to_batch(rows: &[MonthlyAggregate]) -> Result<RecordBatch> {
    let boro_cd = Int32Array::from(rows.iter().map(|r| r.boro_cd).collect::<Vec<_>>());
    let month = TimestampMicrosecondArray::from(
        rows.iter()
            .map(|r| Date32Type::from_naive_date(r.month) as i64 * MICROS_PER_DAY)
            .collect::<Vec<_>>(),
    );
    let counts = rows
        .iter()
        .map(|r| {
            i64::try_from(r.permit_count).map_err(|_| {
                PipelineError::Config(format!("permit count {} overflows Int64", r.permit_count))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RecordBatch::try_new(
        aggregate_schema(),
        vec![Arc::new(boro_cd), Arc::new(month), Arc::new(Int64Array::from(counts))],
    )?)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write to a sibling temp file and rename it over `path` once complete
fn write_atomic<F>(path: &Path, rows: usize, write: F) -> Result<StoredOutput>
where
    F: FnOnce(File) -> Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let outcome = File::create(&tmp)
        .map_err(PipelineError::from)
        .and_then(write);
    if let Err(e) = outcome {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    let bytes = fs::read(&tmp)?;
    fs::rename(&tmp, path)?;
    info!("Wrote {} rows to {}", rows, path.display());
    Ok(StoredOutput {
        path: path.display().to_string(),
        rows,
        sha256: sha256_hex(&bytes),
    })
}

fn write_batch(path: &Path, batch: RecordBatch) -> Result<StoredOutput> {
    let rows = batch.num_rows();
    write_atomic(path, rows, |file| {
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    })
}

fn open_reader(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    if !path.exists() {
        return Err(PipelineError::MissingInput(path.display().to_string()));
    }
    Ok(ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?)
}

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let reader = open_reader(path)?.build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    debug!("Read {} batches from {}", batches.len(), path.display());
    Ok(batches)
}

fn column_of<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
    table: &str,
    path: &Path,
) -> Result<&'a T> {
    let index = batch
        .schema()
        .index_of(name)
        .map_err(|_| PipelineError::MissingColumn {
            source_system: table.to_string(),
            column: name.to_string(),
            path: path.display().to_string(),
        })?;
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| {
            PipelineError::Config(format!(
                "column '{}' in {} has unexpected type {}",
                name,
                path.display(),
                batch.column(index).data_type()
            ))
        })
}

fn batch_to_permits(batch: &RecordBatch, table: &str, path: &Path) -> Result<Vec<CanonicalPermit>> {
    let source = column_of::<StringArray>(batch, CanonicalField::SourceSystem.name(), table, path)?;
    let mut permits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let tag = source.is_valid(row).then(|| source.value(row));
        let source_system = tag.and_then(SourceSystem::parse).ok_or_else(|| {
            PipelineError::Config(format!(
                "row {} in {} has an unknown source_system {:?}",
                row,
                path.display(),
                tag
            ))
        })?;
        permits.push(CanonicalPermit::empty(source_system));
    }

    for field in CanonicalField::ALL.iter().skip(1).copied() {
        let name = field.name();
        match field.kind() {
            FieldKind::Text => {
                let array = column_of::<StringArray>(batch, name, table, path)?;
                for (row, permit) in permits.iter_mut().enumerate() {
                    let value = array.is_valid(row).then(|| array.value(row).to_string());
                    permit.set_text(field, value);
                }
            }
            FieldKind::Date => {
                let array = column_of::<Date32Array>(batch, name, table, path)?;
                for (row, permit) in permits.iter_mut().enumerate() {
                    let value = array
                        .is_valid(row)
                        .then(|| Date32Type::to_naive_date(array.value(row)));
                    permit.set_date(field, value);
                }
            }
            FieldKind::Numeric => {
                let array = column_of::<Float64Array>(batch, name, table, path)?;
                for (row, permit) in permits.iter_mut().enumerate() {
                    permit.set_numeric(field, array.is_valid(row).then(|| array.value(row)));
                }
            }
        }
    }
    Ok(permits)
}

impl TableStore for ParquetTableStore {
    fn read_raw(&self, source: SourceSystem, path: &Path, columns: &[&str]) -> Result<RawTable> {
        let builder = open_reader(path)?;
        let schema = builder.schema().clone();

        let mut roots = Vec::with_capacity(columns.len());
        for column in columns {
            let index = schema
                .index_of(column)
                .map_err(|_| PipelineError::MissingColumn {
                    source_system: source.to_string(),
                    column: column.to_string(),
                    path: path.display().to_string(),
                })?;
            roots.push(index);
        }

        let mask = ProjectionMask::roots(builder.parquet_schema(), roots);
        let reader = builder.with_projection(mask).build()?;

        let mut values: BTreeMap<&str, Vec<Option<String>>> =
            columns.iter().map(|c| (*c, Vec::new())).collect();
        for batch in reader {
            let batch = batch?;
            for column in columns {
                let index = batch.schema().index_of(column)?;
                // Raw feeds are typed loosely upstream; everything is read as text
                let text = cast(batch.column(index), &DataType::Utf8)?;
                let strings = text.as_string_opt::<i32>().ok_or_else(|| {
                    PipelineError::Config(format!("column '{}' could not be read as text", column))
                })?;
                if let Some(cells) = values.get_mut(column) {
                    cells.extend(
                        (0..strings.len())
                            .map(|i| strings.is_valid(i).then(|| strings.value(i).to_string())),
                    );
                }
            }
        }

        let mut table = RawTable::new(path.display().to_string());
        for (column, cells) in values {
            table = table.with_column(column, cells)?;
        }
        info!(
            "Read {} rows ({} columns) of {} from {}",
            table.len,
            columns.len(),
            source,
            path.display()
        );
        Ok(table)
    }

    fn write_unified(&self, path: &Path, permits: &[CanonicalPermit]) -> Result<StoredOutput> {
        write_batch(path, permits_to_batch(permits)?)
    }

    fn read_unified(&self, path: &Path) -> Result<Vec<CanonicalPermit>> {
        let mut permits = Vec::new();
        for batch in read_batches(path)? {
            permits.extend(batch_to_permits(&batch, UNIFIED_TABLE, path)?);
        }
        Ok(permits)
    }

    fn write_enriched(&self, path: &Path, permits: &[GeoEnrichedPermit]) -> Result<StoredOutput> {
        write_batch(path, enriched_to_batch(permits)?)
    }

    fn read_enriched(&self, path: &Path) -> Result<Vec<GeoEnrichedPermit>> {
        let mut enriched = Vec::new();
        for batch in read_batches(path)? {
            let permits = batch_to_permits(&batch, ENRICHED_TABLE, path)?;
            let boro_cd = column_of::<Int32Array>(&batch, BORO_CD_COLUMN, ENRICHED_TABLE, path)?;
            enriched.extend(permits.into_iter().enumerate().map(|(row, permit)| {
                GeoEnrichedPermit {
                    permit,
                    boro_cd: boro_cd.is_valid(row).then(|| boro_cd.value(row)),
                }
            }));
        }
        Ok(enriched)
    }

    fn write_aggregates(&self, path: &Path, rows: &[MonthlyAggregate]) -> Result<StoredOutput> {
        write_batch(path, aggregates_to_batch(rows)?)
    }

    fn read_aggregates(&self, path: &Path) -> Result<Vec<MonthlyAggregate>> {
        let mut rows = Vec::new();
        for batch in read_batches(path)? {
            let boro_cd =
                column_of::<Int32Array>(&batch, BORO_CD_COLUMN, AGGREGATE_TABLE, path)?;
            let month = column_of::<TimestampMicrosecondArray>(
                &batch,
                MONTH_COLUMN,
                AGGREGATE_TABLE,
                path,
            )?;
            let count =
                column_of::<Int64Array>(&batch, PERMIT_COUNT_COLUMN, AGGREGATE_TABLE, path)?;

            for row in 0..batch.num_rows() {
                if boro_cd.is_null(row) || month.is_null(row) || count.is_null(row) {
                    return Err(PipelineError::Config(format!(
                        "row {} in {} has a null aggregate cell",
                        row,
                        path.display()
                    )));
                }
                let days = month.value(row).div_euclid(MICROS_PER_DAY) as i32;
                let permit_count = u64::try_from(count.value(row)).map_err(|_| {
                    PipelineError::Config(format!(
                        "row {} in {} has a negative permit_count",
                        row,
                        path.display()
                    ))
                })?;
                rows.push(MonthlyAggregate {
                    boro_cd: boro_cd.value(row),
                    month: Date32Type::to_naive_date(days),
                    permit_count,
                });
            }
        }
        Ok(rows)
    }

    fn write_document(&self, path: &Path, contents: &[u8], rows: usize) -> Result<StoredOutput> {
        write_atomic(path, rows, |mut file| {
            use std::io::Write;
            file.write_all(contents)?;
            file.sync_all()?;
            Ok(())
        })
    }

    fn read_document(&self, path: &Path) -> Result<Vec<u8>> {
        if !path.exists() {
            return Err(PipelineError::MissingInput(path.display().to_string()));
        }
        Ok(fs::read(path)?)
    }
}
