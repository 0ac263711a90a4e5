//! Criterion benchmarks for the D-Bus value JSON codec.
//!
//! Measures frame decoding (the hot path for every client request) and value
//! encoding (the hot path for every signal forwarded to clients).
//!
//! Run with:
//! ```bash
//! cargo bench --package dbus-ws-core --bench value_codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dbus_ws_core::{
    decode_input, decode_value, encode_output, encode_value, DBusValue, OutputMessage,
    PrimitiveType, ValueType,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const NOTIFY_FRAME: &str = r#"{"CallMethod":{"requestId":123,"destination":"org.freedesktop.Notifications","path":"/org/freedesktop/Notifications","interface":"org.freedesktop.Notifications","methodName":"Notify","args":[{"type":"string","value":"bench"},{"type":"u32","value":0},{"type":"string","value":""},{"type":"string","value":"Hello"},{"type":"string","value":"World"},{"type":"array","valueType":"string"},{"type":"dict","value":{"urgency":{"type":"variant","value":{"type":"u8","value":1}}}},{"type":"i32","value":5000}]}}"#;

fn make_properties(entries: usize) -> DBusValue {
    let entries = (0..entries)
        .map(|i| {
            (
                DBusValue::string(format!("Property{i}")),
                DBusValue::Variant(Box::new(DBusValue::U32(i as u32))),
            )
        })
        .collect();
    DBusValue::dict(PrimitiveType::Str, ValueType::Variant, entries).expect("valid dict")
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_decode_frame(c: &mut Criterion) {
    c.bench_function("decode_notify_frame", |b| {
        b.iter(|| decode_input(black_box(NOTIFY_FRAME)).expect("decode"))
    });
}

fn bench_value_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("properties_dict");
    for size in [4usize, 32, 256] {
        let value = make_properties(size);
        let json = encode_value(&value);

        group.bench_with_input(BenchmarkId::new("encode", size), &value, |b, v| {
            b.iter(|| encode_value(black_box(v)))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &json, |b, j| {
            b.iter(|| decode_value(black_box(j)).expect("decode"))
        });
    }
    group.finish();
}

fn bench_encode_signal_frame(c: &mut Criterion) {
    let msg = OutputMessage::MethodReturn {
        request_id: Some(1),
        args: vec![make_properties(16)],
    };
    c.bench_function("encode_method_return_frame", |b| {
        b.iter(|| encode_output(black_box(&msg)).expect("encode"))
    });
}

criterion_group!(
    benches,
    bench_decode_frame,
    bench_value_codec,
    bench_encode_signal_frame
);
criterion_main!(benches);
