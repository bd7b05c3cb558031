pub mod error;
pub mod memory_store;
pub mod parquet_store;

pub use error::{StorageError, StorageResult};
pub use memory_store::MemoryStore;
pub use parquet_store::{DatasetInfo, ParquetStore};

use arrow::array::{new_null_array, ArrayRef};
use arrow::compute::{cast_with_options, concat_batches, CastOptions};
use arrow::datatypes::{DataType, FieldRef, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;

/// A named tabular dataset as held in memory.
pub type Table = RecordBatch;

/// Named tabular datasets addressed by logical name (e.g. `raw/historical`).
///
/// Implementations assume a single writer per dataset. `append` is a
/// read-modify-write and must be serialized by the caller.
pub trait TabularStore: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    fn read(&self, name: &str) -> StorageResult<Table>;

    /// Replace the dataset, creating it if needed.
    fn write(&self, name: &str, table: &Table) -> StorageResult<()>;

    /// Append rows after the existing ones, preserving order.
    /// Equivalent to `write` when the dataset does not exist yet.
    ///
    /// Column types that differ between the stored rows and the new ones are
    /// widened (see [`common_type`]) and both sides are converted.
    fn append(&self, name: &str, table: &Table) -> StorageResult<()> {
        if !self.exists(name) {
            return self.write(name, table);
        }

        let existing = self.read(name)?;
        let schema = widen_schema(&existing.schema(), &table.schema());
        let existing = align_to_schema(name, &existing, schema.clone())?;
        let aligned = align_to_schema(name, table, schema.clone())?;
        let combined = concat_batches(&schema, [&existing, &aligned])?;

        self.write(name, &combined)
    }
}

/// Type able to hold values of both `a` and `b` without loss:
/// `Null` takes the other type, integers widen to `Int64`, mixed numerics to
/// `Float64`, anything else to `Utf8`.
pub fn common_type(a: &DataType, b: &DataType) -> DataType {
    match (a, b) {
        (a, b) if a == b => a.clone(),
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (a, b) if a.is_integer() && b.is_integer() => DataType::Int64,
        (a, b) if a.is_numeric() && b.is_numeric() => DataType::Float64,
        _ => DataType::Utf8,
    }
}

/// `existing` with every column shared with `incoming` widened to their
/// common type. Column order and metadata follow `existing`.
pub fn widen_schema(existing: &Schema, incoming: &Schema) -> SchemaRef {
    let fields: Vec<FieldRef> = existing
        .fields()
        .iter()
        .map(|field| match incoming.field_with_name(field.name()) {
            Ok(other) if other.data_type() != field.data_type() => {
                let widened = common_type(field.data_type(), other.data_type());
                if &widened == field.data_type() {
                    field.clone()
                } else {
                    Arc::new(
                        field
                            .as_ref()
                            .clone()
                            .with_data_type(widened)
                            .with_nullable(true),
                    )
                }
            }
            _ => field.clone(),
        })
        .collect();

    Arc::new(Schema::new_with_metadata(fields, existing.metadata().clone()))
}

/// Reorder, cast and null-fill the columns of `table` so it matches `schema`.
///
/// Columns unknown to `schema` are rejected rather than silently dropped.
/// A conversion that would lose a value is an error.
pub fn align_to_schema(name: &str, table: &Table, schema: SchemaRef) -> StorageResult<Table> {
    let incoming = table.schema();
    if let Some(extra) = incoming
        .fields()
        .iter()
        .find(|f| schema.field_with_name(f.name()).is_err())
    {
        return Err(StorageError::SchemaMismatch {
            name: name.to_string(),
            detail: format!(
                "column '{}' is not present in the existing dataset",
                extra.name()
            ),
        });
    }

    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let columns = schema
        .fields()
        .iter()
        .map(|field| -> StorageResult<ArrayRef> {
            match table.column_by_name(field.name()) {
                Some(column) if column.data_type() == field.data_type() => Ok(column.clone()),
                Some(column) => cast_with_options(column, field.data_type(), &options).map_err(|e| {
                    StorageError::SchemaMismatch {
                        name: name.to_string(),
                        detail: format!(
                            "column '{}' cannot be converted from {} to {}: {}",
                            field.name(),
                            column.data_type(),
                            field.data_type(),
                            e
                        ),
                    }
                }),
                None => Ok(new_null_array(field.data_type(), table.num_rows())),
            }
        })
        .collect::<StorageResult<Vec<_>>>()?;

    let batch_options = RecordBatchOptions::new().with_row_count(Some(table.num_rows()));
    Ok(RecordBatch::try_new_with_options(
        schema,
        columns,
        &batch_options,
    )?)
}
