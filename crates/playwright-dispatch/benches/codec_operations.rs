// Benchmarks for the evaluate value codec
//
// Measures encoding of arguments and decoding of results for payloads
// shaped like typical evaluate traffic: flat records, wide arrays and
// values full of special numbers and dates.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use playwright_dispatch::protocol::{parse_value, serialize_argument};
use playwright_dispatch::{JsValue, from_js_value, to_js_value};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::hint::black_box;

#[derive(Serialize, Deserialize)]
struct Row {
    id: u32,
    name: String,
    score: f64,
    tags: Vec<String>,
    parent: Option<u32>,
}

fn rows(count: u32) -> Vec<Row> {
    (0..count)
        .map(|i| Row {
            id: i,
            name: format!("row-{}", i),
            score: i as f64 / 3.0,
            tags: vec!["a".into(), "b".into()],
            parent: (i % 2 == 0).then_some(i / 2),
        })
        .collect()
}

fn special_envelope(count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| match i % 4 {
            0 => json!({ "v": "NaN" }),
            1 => json!({ "v": "-0" }),
            2 => json!({ "d": "2024-03-01T12:30:00.000Z" }),
            _ => json!({ "o": { "n": i, "missing": { "v": "undefined" } } }),
        })
        .collect();
    json!({ "a": items })
}

fn benchmark_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_encode");

    for count in [10u32, 100, 1000] {
        let value = to_js_value(&rows(count)).unwrap();
        group.bench_with_input(BenchmarkId::new("rows", count), &value, |b, value| {
            b.iter(|| black_box(serialize_argument(black_box(value))));
        });
    }

    group.bench_function("serde_to_js_value_100_rows", |b| {
        let data = rows(100);
        b.iter(|| black_box(to_js_value(black_box(&data)).unwrap()));
    });

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_decode");

    for count in [10u32, 100, 1000] {
        let envelope = serialize_argument(&to_js_value(&rows(count)).unwrap()).value;
        group.bench_with_input(BenchmarkId::new("rows", count), &envelope, |b, envelope| {
            b.iter(|| black_box(parse_value(black_box(envelope), &[]).unwrap()));
        });
    }

    let special = special_envelope(400);
    group.bench_function("special_values_400", |b| {
        b.iter(|| black_box(parse_value(black_box(&special), &[]).unwrap()));
    });

    group.bench_function("from_js_value_100_rows", |b| {
        let value: JsValue = to_js_value(&rows(100)).unwrap();
        b.iter(|| black_box(from_js_value::<Vec<Row>>(value.clone()).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, benchmark_encode, benchmark_decode);
criterion_main!(benches);
