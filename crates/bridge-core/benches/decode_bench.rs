//! Criterion benchmarks for telemetry line decoding.
//!
//! Measures per-line decode latency for the line shapes a device actually
//! produces.  The decoder sits on the hot path between the serial reader and
//! the WebSocket fan-out, so it runs once per line at full telemetry rate.
//!
//! Run with:
//! ```bash
//! cargo bench --package bridge-core --bench decode_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bridge_core::decode_line;

// ── Line fixtures ─────────────────────────────────────────────────────────────

fn make_telemetry_line() -> String {
    "[00012345|sensors/imu      ] ax=0.013 ay=9.807 az=-0.020".to_string()
}

fn make_console_line() -> String {
    "Initialising peripherals... OK".to_string()
}

fn make_long_payload_line() -> String {
    let payload: String = (0..64).map(|i| format!(" f{i}={:.4}", i as f64 * 0.01)).collect();
    format!("[00099999|sensors/bulk     ]{payload}")
}

fn make_headerless_dump_line() -> String {
    "PC      : 0x400d1a2b  PS      : 0x00060330  A0      : 0x800d2000".to_string()
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

/// Benchmarks `decode_line` across representative line shapes.
fn bench_decode(c: &mut Criterion) {
    let lines: &[(&str, String)] = &[
        ("telemetry", make_telemetry_line()),
        ("console", make_console_line()),
        ("long_payload", make_long_payload_line()),
        ("headerless_dump", make_headerless_dump_line()),
    ];

    let mut group = c.benchmark_group("decode_line");
    for (name, line) in lines {
        group.bench_function(*name, |b| b.iter(|| decode_line(black_box(line))));
    }
    group.finish();
}

/// Benchmarks decoding a sustained burst, the shape of a sensor stream.
fn bench_decode_burst(c: &mut Criterion) {
    let burst: Vec<String> = (0..100)
        .map(|i| format!("[{:08}|sensors/adc      ] v={:.3}", i * 5, 1.65))
        .collect();

    c.bench_function("decode_line/burst_100", |b| {
        b.iter(|| {
            for line in &burst {
                black_box(decode_line(black_box(line)));
            }
        })
    });
}

criterion_group!(benches, bench_decode, bench_decode_burst);
criterion_main!(benches);
