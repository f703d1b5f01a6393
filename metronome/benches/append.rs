//! Microbenchmarks for the per-sample path.
//!
//! Measures `append` on a bare store, a full `Recorder::sample` (getter call,
//! timestamp, write lock), and saving a recording to disk.
//!
//! Run with: `cargo bench -p metronome -- append`

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use metronome::{Recorder, Row, SeriesStore, Value};
use tempfile::tempdir;

/// Field names `field_0..field_{count}`.
fn field_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("field_{i}")).collect()
}

/// A row holding `42.5` for every field plus `time`.
fn full_row(fields: &[String]) -> Row {
    fields
        .iter()
        .map(|f| (f.clone(), Value::from(42.5)))
        .chain([("time".to_string(), Value::from(1_700_000_000.0))])
        .collect()
}

fn bench_append_field_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("append/field_count");

    for count in [1, 10, 30, 100] {
        let fields = field_names(count);
        let mut store = SeriesStore::new(&fields).unwrap();
        let row = full_row(&fields);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| store.append(black_box(&row)).unwrap());
        });
    }

    group.finish();
}

fn bench_recorder_sample(c: &mut Criterion) {
    let fields = field_names(10);
    let row = full_row(&fields);
    let recorder = Recorder::with_getter(&fields, move || Ok(row.clone())).unwrap();

    c.bench_function("append/recorder_sample_10_fields", |b| {
        b.iter(|| recorder.sample(black_box(None)).unwrap());
    });
}

fn bench_save(c: &mut Criterion) {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("bench.json");

    let fields = field_names(10);
    let mut store = SeriesStore::new(&fields).unwrap();
    let row = full_row(&fields);
    for _ in 0..3600 {
        store.append(&row).unwrap();
    }

    c.bench_function("append/save_3600_rows", |b| {
        b.iter(|| store.save(black_box(&path)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_append_field_count,
    bench_recorder_sample,
    bench_save,
);
criterion_main!(benches);
