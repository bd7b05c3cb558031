use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use wx_pipeline::clock::FixedClock;
use wx_pipeline::models::{observations_to_table, with_date_process, Observation};
use wx_pipeline::processors::{group_key, Aggregator, LeftJoin};
use wx_pipeline::store::{MemoryStore, Table, TabularStore};
use wx_pipeline::utils::constants::*;

// Create test data for benchmarking: `municipalities` locations, 4 forecast days each
fn create_forecast_batch(municipalities: usize) -> Table {
    let mut records = Vec::with_capacity(municipalities * 4);
    for idmun in 1..=municipalities {
        for ndia in 0..4 {
            let base_temp = 10.0 + (idmun % 17) as f64 + ndia as f64 * 0.5;
            records.push(
                Observation::new(
                    (idmun % 32 + 1) as i64,
                    idmun as i64,
                    "Yucatán",
                    &format!("Municipio {}", idmun),
                )
                .with_day(ndia)
                .with_location(&format!("2023032{}", 5 + ndia))
                .with_temperatures(Some(base_temp), Some(base_temp + 12.0)),
            );
        }
    }
    observations_to_table(&records).unwrap()
}

fn create_reference_table(municipalities: usize) -> Table {
    let schema = Arc::new(Schema::new(vec![
        Field::new(DEFAULT_AUX_STATE_COLUMN, DataType::Int64, false),
        Field::new(DEFAULT_AUX_MUNICIPALITY_COLUMN, DataType::Int64, false),
        Field::new("NOM_MUN", DataType::Utf8, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from_iter_values(
                (1..=municipalities).map(|m| (m % 32 + 1) as i64),
            )),
            Arc::new(Int64Array::from_iter_values(
                (1..=municipalities).map(|m| m as i64),
            )),
            Arc::new(StringArray::from_iter_values(
                (1..=municipalities).map(|m| format!("Municipio {}", m)),
            )),
        ],
    )
    .unwrap()
}

fn benchmark_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");
    let now = Utc.with_ymd_and_hms(2023, 3, 25, 14, 0, 0).unwrap();

    for municipalities in [10, 100, 500] {
        let store = Arc::new(MemoryStore::new());
        // Three hourly ingests, two of them inside the window
        let batch = create_forecast_batch(municipalities);
        for hours_ago in [3, 1, 0] {
            let stamped =
                with_date_process(&batch, now - chrono::Duration::hours(hours_ago)).unwrap();
            store.append(HISTORICAL_DATASET, &stamped).unwrap();
        }
        let aggregator = Aggregator::new(store, Arc::new(FixedClock(now)));

        group.bench_with_input(
            BenchmarkId::new("aggregate", municipalities),
            &municipalities,
            |b, _| b.iter(|| black_box(aggregator.aggregate().unwrap())),
        );
    }

    group.finish();
}

fn benchmark_left_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("left_join");
    let left_on = [COL_STATE_CODE, COL_MUNICIPALITY_CODE];
    let right_on = [DEFAULT_AUX_STATE_COLUMN, DEFAULT_AUX_MUNICIPALITY_COLUMN];

    for municipalities in [100, 1000, 2500] {
        let current = create_forecast_batch(municipalities);
        let reference = create_reference_table(municipalities);

        group.bench_with_input(
            BenchmarkId::new("merge", municipalities),
            &municipalities,
            |b, _| {
                b.iter(|| {
                    black_box(
                        LeftJoin::new(&left_on, &right_on)
                            .apply(&current, &reference)
                            .unwrap(),
                    )
                })
            },
        );
    }

    group.finish();
}

fn benchmark_group_key(c: &mut Criterion) {
    c.bench_function("group_key", |b| {
        b.iter(|| black_box(group_key(black_box("Yucatán"), black_box("Mérida"))))
    });
}

criterion_group!(
    benches,
    benchmark_aggregation,
    benchmark_left_join,
    benchmark_group_key
);
criterion_main!(benches);
