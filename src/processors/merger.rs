use crate::error::{PipelineError, Result};
use crate::models::observation::column;
use crate::readers::AuxiliaryReader;
use crate::store::{Table, TabularStore};
use crate::utils::constants::*;
use crate::utils::CancelFlag;
use arrow::array::{Array, ArrayRef, UInt32Array};
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, Field, FieldRef, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::row::{Row, RowConverter, SortField};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub current_rows: usize,
    pub auxiliary_rows: usize,
    pub merged_rows: usize,
    /// Current rows with no auxiliary match
    pub unmatched_rows: usize,
}

/// Enriches the current snapshot with the auxiliary municipality reference.
pub struct Merger {
    store: Arc<dyn TabularStore>,
    aux_path: PathBuf,
    aux_reader: AuxiliaryReader,
    aux_state_column: String,
    aux_municipality_column: String,
    cancel: CancelFlag,
}

impl Merger {
    pub fn new(store: Arc<dyn TabularStore>, aux_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            aux_path: aux_path.into(),
            aux_reader: AuxiliaryReader::new(),
            aux_state_column: DEFAULT_AUX_STATE_COLUMN.to_string(),
            aux_municipality_column: DEFAULT_AUX_MUNICIPALITY_COLUMN.to_string(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_reader(mut self, reader: AuxiliaryReader) -> Self {
        self.aux_reader = reader;
        self
    }

    pub fn with_key_columns(mut self, state: &str, municipality: &str) -> Self {
        self.aux_state_column = state.to_string();
        self.aux_municipality_column = municipality.to_string();
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn merge(&self) -> Result<MergeReport> {
        let current = self.store.read(CURRENT_DATASET)?;
        let auxiliary = self.aux_reader.read(&self.aux_path)?;

        let aux_keys = [
            self.aux_state_column.as_str(),
            self.aux_municipality_column.as_str(),
        ];
        let merged = LeftJoin::new(&[COL_STATE_CODE, COL_MUNICIPALITY_CODE], &aux_keys)
            .apply(&current, &auxiliary)?;
        self.cancel.check()?;

        self.store.write(MERGED_DATASET, &merged.table)?;
        info!(
            rows = merged.table.num_rows(),
            unmatched = merged.unmatched_rows,
            "Wrote merged weather data"
        );

        Ok(MergeReport {
            current_rows: current.num_rows(),
            auxiliary_rows: auxiliary.num_rows(),
            merged_rows: merged.table.num_rows(),
            unmatched_rows: merged.unmatched_rows,
        })
    }
}

pub struct JoinOutput {
    pub table: Table,
    pub unmatched_rows: usize,
}

/// Left join on equal key tuples. Every left row is kept; right-side key
/// columns are dropped from the output. Clashing non-key column names get
/// `_x` (left) and `_y` (right) suffixes.
pub struct LeftJoin<'a> {
    left_on: &'a [&'a str],
    right_on: &'a [&'a str],
}

impl<'a> LeftJoin<'a> {
    pub fn new(left_on: &'a [&'a str], right_on: &'a [&'a str]) -> Self {
        Self { left_on, right_on }
    }

    pub fn apply(&self, left: &Table, right: &Table) -> Result<JoinOutput> {
        let (left_keys, right_keys) = self.key_columns(left, right)?;

        let converter = RowConverter::new(
            left_keys
                .iter()
                .map(|c| SortField::new(c.data_type().clone()))
                .collect(),
        )?;
        let left_rows = converter.convert_columns(&left_keys)?;
        let right_rows = converter.convert_columns(&right_keys)?;

        // Null keys never match
        let mut lookup: HashMap<Row<'_>, Vec<u32>> = HashMap::new();
        for j in 0..right.num_rows() {
            if !has_null(&right_keys, j) {
                lookup.entry(right_rows.row(j)).or_default().push(j as u32);
            }
        }

        let mut left_indices: Vec<u32> = Vec::with_capacity(left.num_rows());
        let mut right_indices: Vec<Option<u32>> = Vec::with_capacity(left.num_rows());
        let mut unmatched_rows = 0;

        for i in 0..left.num_rows() {
            let matches = if has_null(&left_keys, i) {
                None
            } else {
                lookup.get(&left_rows.row(i))
            };

            match matches {
                Some(rows) => {
                    for &j in rows {
                        left_indices.push(i as u32);
                        right_indices.push(Some(j));
                    }
                }
                None => {
                    left_indices.push(i as u32);
                    right_indices.push(None);
                    unmatched_rows += 1;
                }
            }
        }

        let left_take = UInt32Array::from(left_indices);
        let right_take = UInt32Array::from(right_indices);
        let table = self.assemble(left, right, &left_take, &right_take)?;

        Ok(JoinOutput {
            table,
            unmatched_rows,
        })
    }

    /// Key columns of both sides, coerced to a common type per key
    fn key_columns(&self, left: &Table, right: &Table) -> Result<(Vec<ArrayRef>, Vec<ArrayRef>)> {
        if self.left_on.len() != self.right_on.len() {
            return Err(PipelineError::Config(format!(
                "join key count mismatch: {} vs {}",
                self.left_on.len(),
                self.right_on.len()
            )));
        }

        let mut left_keys = Vec::with_capacity(self.left_on.len());
        let mut right_keys = Vec::with_capacity(self.right_on.len());

        for (left_name, right_name) in self.left_on.iter().zip(self.right_on) {
            let l = column(left, left_name)?;
            let r = right.column_by_name(right_name).ok_or_else(|| {
                PipelineError::JoinInput(format!("auxiliary data has no '{}' column", right_name))
            })?;

            let common = match (l.data_type(), r.data_type()) {
                (a, b) if a == b => a.clone(),
                (a, b) if a.is_numeric() && b.is_numeric() => DataType::Float64,
                _ => DataType::Utf8,
            };
            left_keys.push(cast(l, &common)?);
            right_keys.push(cast(r, &common)?);
        }

        Ok((left_keys, right_keys))
    }

    fn assemble(
        &self,
        left: &Table,
        right: &Table,
        left_take: &UInt32Array,
        right_take: &UInt32Array,
    ) -> Result<Table> {
        let left_schema = left.schema();
        let right_schema = right.schema();

        let right_payload: Vec<usize> = right_schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| !self.right_on.contains(&f.name().as_str()))
            .map(|(j, _)| j)
            .collect();

        let left_names: HashSet<&str> = left_schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        let clashes: HashSet<&str> = right_payload
            .iter()
            .map(|&j| right_schema.field(j).name().as_str())
            .filter(|name| left_names.contains(name))
            .collect();

        let mut fields: Vec<FieldRef> = Vec::new();
        let mut columns: Vec<ArrayRef> = Vec::new();

        for (i, field) in left_schema.fields().iter().enumerate() {
            let name = if clashes.contains(field.name().as_str()) {
                format!("{}_x", field.name())
            } else {
                field.name().clone()
            };
            fields.push(Arc::new(field.as_ref().clone().with_name(name)));
            columns.push(take(left.column(i).as_ref(), left_take, None)?);
        }

        for &j in &right_payload {
            let field = right_schema.field(j);
            let name = if clashes.contains(field.name().as_str()) {
                format!("{}_y", field.name())
            } else {
                field.name().clone()
            };
            fields.push(Arc::new(Field::new(name, field.data_type().clone(), true)));
            columns.push(take(right.column(j).as_ref(), right_take, None)?);
        }

        let options = RecordBatchOptions::new().with_row_count(Some(left_take.len()));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(Schema::new(fields)),
            columns,
            &options,
        )?)
    }
}

fn has_null(columns: &[ArrayRef], row: usize) -> bool {
    columns.iter().any(|c| c.is_null(row))
}
