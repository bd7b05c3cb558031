use crate::error::{PipelineError, Result};
use crate::store::Table;
use crate::utils::constants::*;
use arrow::array::{
    Array, ArrayRef, AsArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Field, FieldRef, Float64Type, Schema, TimeUnit, TimestampMicrosecondType,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const UTC: &str = "UTC";

/// One SMN row restricted to the columns the pipeline interprets.
/// Payload tables may carry any number of further pass-through columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub ides: i64,
    pub idmun: i64,
    pub ndia: i64,
    pub nes: String,
    pub nmun: String,
    pub dloc: String,
    pub tmin: Option<f64>,
    pub tmax: Option<f64>,
}

impl Observation {
    pub fn new(ides: i64, idmun: i64, nes: &str, nmun: &str) -> Self {
        Self {
            ides,
            idmun,
            ndia: 0,
            nes: nes.to_string(),
            nmun: nmun.to_string(),
            dloc: String::new(),
            tmin: None,
            tmax: None,
        }
    }

    pub fn with_day(mut self, ndia: i64) -> Self {
        self.ndia = ndia;
        self
    }

    pub fn with_location(mut self, dloc: &str) -> Self {
        self.dloc = dloc.to_string();
        self
    }

    pub fn with_temperatures(mut self, tmin: Option<f64>, tmax: Option<f64>) -> Self {
        self.tmin = tmin;
        self.tmax = tmax;
        self
    }
}

/// Arrow type of the `date_process` column
pub fn date_process_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some(UTC.into()))
}

pub fn date_process_field() -> Field {
    Field::new(COL_DATE_PROCESS, date_process_type(), true)
}

/// A `date_process` column holding the same instant on every row
pub fn date_process_array(instant: DateTime<Utc>, rows: usize) -> ArrayRef {
    Arc::new(
        TimestampMicrosecondArray::from_value(instant.timestamp_micros(), rows).with_timezone(UTC),
    )
}

/// Convert observations to a table with the SMN column layout
pub fn observations_to_table(records: &[Observation]) -> Result<Table> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(COL_STATE_CODE, DataType::Int64, true),
        Field::new(COL_MUNICIPALITY_CODE, DataType::Int64, true),
        Field::new(COL_DAY, DataType::Int64, true),
        Field::new(COL_STATE_NAME, DataType::Utf8, true),
        Field::new(COL_MUNICIPALITY_NAME, DataType::Utf8, true),
        Field::new(COL_LOCATION, DataType::Utf8, true),
        Field::new(COL_TMIN, DataType::Float64, true),
        Field::new(COL_TMAX, DataType::Float64, true),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.ides))),
        Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.idmun))),
        Arc::new(Int64Array::from_iter_values(records.iter().map(|r| r.ndia))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| &r.nes))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| &r.nmun))),
        Arc::new(StringArray::from_iter_values(records.iter().map(|r| &r.dloc))),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.tmin))),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.tmax))),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Set `date_process` to `instant` on every row, replacing any existing
/// column of that name in place.
pub fn with_date_process(table: &Table, instant: DateTime<Utc>) -> Result<Table> {
    let schema = table.schema();
    let stamp = date_process_array(instant, table.num_rows());
    let stamp_field: FieldRef = Arc::new(date_process_field());

    let mut fields: Vec<FieldRef> = Vec::with_capacity(schema.fields().len() + 1);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len() + 1);
    let mut replaced = false;

    for (field, column) in schema.fields().iter().zip(table.columns()) {
        if field.name() == COL_DATE_PROCESS {
            fields.push(stamp_field.clone());
            columns.push(stamp.clone());
            replaced = true;
        } else {
            fields.push(field.clone());
            columns.push(column.clone());
        }
    }
    if !replaced {
        fields.push(stamp_field);
        columns.push(stamp);
    }

    let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
    let options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
}

pub fn column<'a>(table: &'a Table, name: &str) -> Result<&'a ArrayRef> {
    table
        .column_by_name(name)
        .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
}

/// Column rendered as text; numeric columns are formatted
pub fn string_column(table: &Table, name: &str) -> Result<StringArray> {
    let values = cast(column(table, name)?, &DataType::Utf8)?;
    Ok(values.as_string::<i32>().clone())
}

/// Column as Float64; unparseable values become null
pub fn float_column(table: &Table, name: &str) -> Result<Float64Array> {
    let values = cast(column(table, name)?, &DataType::Float64)?;
    Ok(values.as_primitive::<Float64Type>().clone())
}

pub fn timestamp_column(table: &Table, name: &str) -> Result<TimestampMicrosecondArray> {
    let values = cast(column(table, name)?, &date_process_type())?;
    Ok(values.as_primitive::<TimestampMicrosecondType>().clone())
}

/// Number of null entries in `name`, or `None` if the column is absent
pub fn null_count(table: &Table, name: &str) -> Option<usize> {
    table.column_by_name(name).map(|c| c.null_count())
}
