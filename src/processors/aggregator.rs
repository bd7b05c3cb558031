use crate::clock::Clock;
use crate::error::{PipelineError, Result};
use crate::models::observation::{
    column, date_process_array, date_process_field, float_column, timestamp_column,
};
use crate::processors::group_key::{dataset_name, row_group_keys};
use crate::store::{Table, TabularStore};
use crate::utils::constants::*;
use crate::utils::CancelFlag;
use arrow::array::{Array, ArrayRef, Float64Array, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow::row::{Row, RowConverter, Rows, SortField};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: String,
    pub dataset: String,
    /// Historical rows of this key inside the window
    pub window_rows: usize,
    /// Aggregate rows written
    pub output_rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AggregateReport {
    pub historical_rows: usize,
    pub groups: Vec<GroupSummary>,
}

/// Per-municipality temperature means over a trailing window of the
/// historical dataset.
pub struct Aggregator {
    store: Arc<dyn TabularStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
    cancel: CancelFlag,
}

impl Aggregator {
    pub fn new(store: Arc<dyn TabularStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            window: Duration::minutes(DEFAULT_WINDOW_MINUTES as i64),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Recompute every `processed/{key}_avg_t` dataset.
    ///
    /// Keys come from the whole history, rows from the window only, so a key
    /// with no recent rows still gets its (empty) dataset rewritten.
    pub fn aggregate(&self) -> Result<AggregateReport> {
        let started = self.clock.now();
        let cutoff = started
            .checked_sub_signed(self.window)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "aggregation window of {} minutes reaches before the earliest representable time",
                    self.window.num_minutes()
                ))
            })?
            .timestamp_micros();

        let history = self.store.read(HISTORICAL_DATASET)?;
        info!(
            rows = history.num_rows(),
            window_minutes = self.window.num_minutes(),
            "Aggregating historical data"
        );

        // Phase one: every key ever seen
        let keys = row_group_keys(&history)?;
        let mut partitions: BTreeMap<&str, Vec<u32>> =
            keys.iter().map(|key| (key.as_str(), Vec::new())).collect();

        // Phase two: assign in-window rows to their key
        let stamps = timestamp_column(&history, COL_DATE_PROCESS)?;
        for (i, key) in keys.iter().enumerate() {
            if stamps.is_valid(i) && stamps.value(i) >= cutoff {
                if let Some(rows) = partitions.get_mut(key.as_str()) {
                    rows.push(i as u32);
                }
            }
        }

        let inputs = GroupInputs::new(&history)?;
        self.cancel.check()?;

        let mut report = AggregateReport {
            historical_rows: history.num_rows(),
            groups: Vec::with_capacity(partitions.len()),
        };

        for (key, rows) in partitions {
            let table = inputs.aggregate(&rows, self.clock.now())?;
            let dataset = dataset_name(key);
            self.store.write(&dataset, &table)?;
            debug!(
                dataset = %dataset,
                window_rows = rows.len(),
                output_rows = table.num_rows(),
                "Wrote aggregate"
            );

            report.groups.push(GroupSummary {
                key: key.to_string(),
                dataset,
                window_rows: rows.len(),
                output_rows: table.num_rows(),
            });
        }

        info!(groups = report.groups.len(), "Aggregation complete");
        Ok(report)
    }
}

/// Columns of the historical table needed to aggregate any subset of it
struct GroupInputs {
    key_columns: Vec<ArrayRef>,
    key_rows: Rows,
    tmin: Float64Array,
    tmax: Float64Array,
    schema: SchemaRef,
}

impl GroupInputs {
    fn new(history: &Table) -> Result<Self> {
        let key_columns = GROUP_COLUMNS
            .iter()
            .map(|name| column(history, name).cloned())
            .collect::<Result<Vec<_>>>()?;

        let converter = RowConverter::new(
            key_columns
                .iter()
                .map(|c| SortField::new(c.data_type().clone()))
                .collect(),
        )?;
        let key_rows = converter.convert_columns(&key_columns)?;

        let mut fields: Vec<Field> = GROUP_COLUMNS
            .iter()
            .zip(&key_columns)
            .map(|(name, c)| Field::new(*name, c.data_type().clone(), true))
            .collect();
        fields.push(Field::new(COL_TMIN, DataType::Float64, true));
        fields.push(Field::new(COL_TMAX, DataType::Float64, true));
        fields.push(date_process_field());

        Ok(Self {
            key_columns,
            key_rows,
            tmin: float_column(history, COL_TMIN)?,
            tmax: float_column(history, COL_TMAX)?,
            schema: Arc::new(Schema::new(fields)),
        })
    }

    /// Group `rows` by the location columns, in ascending key order.
    /// Rows with a null grouping value are left out.
    fn aggregate(&self, rows: &[u32], date_process: DateTime<Utc>) -> Result<Table> {
        let mut groups: BTreeMap<Row<'_>, GroupAccumulator> = BTreeMap::new();

        for &row in rows {
            let i = row as usize;
            if self.key_columns.iter().any(|c| c.is_null(i)) {
                continue;
            }
            groups
                .entry(self.key_rows.row(i))
                .or_insert_with(|| GroupAccumulator::new(row))
                .push(value_at(&self.tmin, i), value_at(&self.tmax, i));
        }

        let firsts = UInt32Array::from_iter_values(groups.values().map(|g| g.first_row));
        let mut columns = self
            .key_columns
            .iter()
            .map(|c| take(c.as_ref(), &firsts, None))
            .collect::<std::result::Result<Vec<ArrayRef>, _>>()?;
        columns.push(Arc::new(Float64Array::from_iter(
            groups.values().map(|g| g.tmin.mean()),
        )));
        columns.push(Arc::new(Float64Array::from_iter(
            groups.values().map(|g| g.tmax.mean()),
        )));
        columns.push(date_process_array(date_process, groups.len()));

        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }
}

fn value_at(values: &Float64Array, i: usize) -> Option<f64> {
    if values.is_valid(i) {
        Some(values.value(i))
    } else {
        None
    }
}

struct GroupAccumulator {
    first_row: u32,
    tmin: Mean,
    tmax: Mean,
}

impl GroupAccumulator {
    fn new(first_row: u32) -> Self {
        Self {
            first_row,
            tmin: Mean::default(),
            tmax: Mean::default(),
        }
    }

    fn push(&mut self, tmin: Option<f64>, tmax: Option<f64>) {
        self.tmin.push(tmin);
        self.tmax.push(tmax);
    }
}

/// Arithmetic mean over the non-null values pushed
#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::observation::string_column;
    use crate::models::{observations_to_table, with_date_process, Observation};
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 25, 14, 0, 0).unwrap()
    }

    fn merida(tmin: Option<f64>, tmax: Option<f64>) -> Observation {
        Observation::new(31, 50, "Yucatán", "Mérida")
            .with_location("2023-03-25")
            .with_temperatures(tmin, tmax)
    }

    /// Append `records` to history as if ingested at `at`
    fn ingest_at(store: &MemoryStore, records: &[Observation], at: DateTime<Utc>) {
        let table = observations_to_table(records).unwrap();
        let stamped = with_date_process(&table, at).unwrap();
        store.append(HISTORICAL_DATASET, &stamped).unwrap();
    }

    fn aggregator(store: &Arc<MemoryStore>) -> Aggregator {
        Aggregator::new(store.clone(), Arc::new(FixedClock(now())))
    }

    fn floats(table: &Table, name: &str) -> Vec<Option<f64>> {
        float_column(table, name).unwrap().iter().collect()
    }

    #[test]
    fn test_mean_of_group() {
        let store = Arc::new(MemoryStore::new());
        ingest_at(
            &store,
            &[merida(Some(10.0), Some(20.0)), merida(Some(14.0), Some(22.0))],
            now(),
        );

        let report = aggregator(&store).aggregate().unwrap();
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].dataset, "processed/yucatan_merida_avg_t");

        let result = store.read("processed/yucatan_merida_avg_t").unwrap();
        assert_eq!(result.num_rows(), 1);
        assert_eq!(floats(&result, COL_TMIN), vec![Some(12.0)]);
        assert_eq!(floats(&result, COL_TMAX), vec![Some(21.0)]);

        let stamps = timestamp_column(&result, COL_DATE_PROCESS).unwrap();
        assert_eq!(stamps.value(0), now().timestamp_micros());
    }

    #[test]
    fn test_window_lower_bound_is_inclusive() {
        let store = Arc::new(MemoryStore::new());
        let window = Duration::hours(2);
        ingest_at(&store, &[merida(Some(10.0), Some(30.0))], now() - window);
        ingest_at(
            &store,
            &[merida(Some(50.0), Some(50.0))],
            now() - window - Duration::microseconds(1),
        );

        aggregator(&store).with_window(window).aggregate().unwrap();

        let result = store.read("processed/yucatan_merida_avg_t").unwrap();
        assert_eq!(floats(&result, COL_TMIN), vec![Some(10.0)]);
    }

    #[test]
    fn test_keys_outside_window_still_written_empty() {
        let store = Arc::new(MemoryStore::new());
        ingest_at(
            &store,
            &[Observation::new(1, 1, "Aguascalientes", "Aguascalientes")],
            now() - Duration::days(1),
        );
        ingest_at(&store, &[merida(Some(10.0), Some(20.0))], now());

        let report = aggregator(&store).aggregate().unwrap();

        let keys: Vec<&str> = report.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["aguascalientes_aguascalientes", "yucatan_merida"]);

        let stale = store
            .read("processed/aguascalientes_aguascalientes_avg_t")
            .unwrap();
        assert_eq!(stale.num_rows(), 0);
        assert_eq!(stale.num_columns(), 9);
    }

    #[test]
    fn test_all_null_temperatures_stay_null() {
        let store = Arc::new(MemoryStore::new());
        ingest_at(
            &store,
            &[merida(None, Some(30.0)), merida(None, None)],
            now(),
        );

        aggregator(&store).aggregate().unwrap();

        let result = store.read("processed/yucatan_merida_avg_t").unwrap();
        assert_eq!(floats(&result, COL_TMIN), vec![None]);
        assert_eq!(floats(&result, COL_TMAX), vec![Some(30.0)]);
    }

    #[test]
    fn test_distinct_days_form_distinct_rows() {
        let store = Arc::new(MemoryStore::new());
        ingest_at(
            &store,
            &[
                merida(Some(20.0), Some(30.0)).with_day(1),
                merida(Some(10.0), Some(20.0)).with_day(0),
                merida(Some(12.0), Some(22.0)).with_day(0),
            ],
            now(),
        );

        aggregator(&store).aggregate().unwrap();

        let result = store.read("processed/yucatan_merida_avg_t").unwrap();
        let days = string_column(&result, COL_DAY).unwrap();
        assert_eq!(result.num_rows(), 2);
        assert_eq!(days.value(0), "0");
        assert_eq!(days.value(1), "1");
        assert_eq!(floats(&result, COL_TMIN), vec![Some(11.0), Some(20.0)]);
    }

    #[test]
    fn test_accent_variants_share_a_key() {
        let store = Arc::new(MemoryStore::new());
        ingest_at(
            &store,
            &[
                Observation::new(31, 50, "Yucatán", "Mérida"),
                Observation::new(31, 50, "YUCATAN", "Merida."),
            ],
            now(),
        );

        let report = aggregator(&store).aggregate().unwrap();
        assert_eq!(report.groups.len(), 1);
        // Names differ, so the location groups stay apart
        assert_eq!(report.groups[0].output_rows, 2);
    }

    #[test]
    fn test_missing_history_is_storage_error() {
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            aggregator(&store).aggregate(),
            Err(PipelineError::Storage(_))
        ));
    }

    #[test]
    fn test_missing_column() {
        let store = Arc::new(MemoryStore::new());
        let table = observations_to_table(&[merida(Some(1.0), Some(2.0))]).unwrap();
        store.write(HISTORICAL_DATASET, &table).unwrap();

        assert!(matches!(
            aggregator(&store).aggregate(),
            Err(PipelineError::MissingColumn(name)) if name == COL_DATE_PROCESS
        ));
    }

    #[test]
    fn test_window_beyond_representable_time_is_config_error() {
        let store = Arc::new(MemoryStore::new());
        ingest_at(&store, &[merida(Some(10.0), Some(20.0))], now());

        let result = aggregator(&store)
            .with_window(Duration::try_days(1_000_000_000).unwrap())
            .aggregate();

        assert!(matches!(result, Err(PipelineError::Config(_))));
        assert_eq!(store.names(), vec![HISTORICAL_DATASET.to_string()]);
    }

    #[test]
    fn test_fractional_temperatures_after_integer_batch() {
        use crate::processors::Ingestor;
        use crate::readers::decode_payload;

        let store = Arc::new(MemoryStore::new());
        let hourly = [
            (
                now() - Duration::hours(1),
                r#"[{"ides": 31, "idmun": 50, "nes": "Yucatán", "nmun": "Mérida", "dloc": "2023-03-25", "ndia": 0, "tmin": 20, "tmax": 30}]"#,
            ),
            (
                now(),
                r#"[{"ides": 31, "idmun": 50, "nes": "Yucatán", "nmun": "Mérida", "dloc": "2023-03-25", "ndia": 0, "tmin": 20.5, "tmax": 31.5}]"#,
            ),
        ];
        for (at, payload) in hourly {
            let batch = decode_payload(payload.as_bytes()).unwrap();
            Ingestor::new(store.clone(), Arc::new(FixedClock(at)))
                .ingest(&batch)
                .unwrap();
        }

        aggregator(&store).aggregate().unwrap();

        let result = store.read("processed/yucatan_merida_avg_t").unwrap();
        assert_eq!(floats(&result, COL_TMIN), vec![Some(20.25)]);
        assert_eq!(floats(&result, COL_TMAX), vec![Some(30.75)]);
    }
}
