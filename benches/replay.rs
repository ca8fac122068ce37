//! Replay throughput benchmarks: single-leg dispatch cost and cross-leg
//! baton handoff cost, with output discarded.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use retrace_rs::driver::SoftDriver;
use retrace_rs::output::NullSink;
use retrace_rs::replay::{replay, ReplayConfig};
use retrace_rs::trace::{CallOp, VecSource};
use std::sync::Arc;

const FRAMES: u32 = 64;
const DRAWS_PER_FRAME: u32 = 16;

fn frame_ops(legs: u32) -> Vec<(u32, CallOp)> {
    let mut ops = Vec::new();
    ops.push((0, CallOp::Viewport {
        width: 128,
        height: 128,
    }));
    for frame in 0..FRAMES {
        ops.push((0, CallOp::Clear {
            color: [frame as u8, 0, 0, 255],
        }));
        for draw in 0..DRAWS_PER_FRAME {
            // Round-robin across legs: worst case for handoff frequency.
            let leg = draw % legs;
            ops.push((leg, CallOp::FillRect {
                x: draw % 96,
                y: (draw * 7) % 96,
                w: 16,
                h: 16,
                color: [0, draw as u8, 0, 255],
            }));
        }
        ops.push((0, CallOp::Present));
    }
    ops
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    let calls = frame_ops(1).len() as u64;
    group.throughput(Throughput::Elements(calls));

    for legs in [1u32, 2, 4] {
        group.bench_function(format!("legs_{legs}"), |b| {
            b.iter_batched(
                || frame_ops(legs),
                |ops| {
                    let report = replay(
                        Box::new(VecSource::from_ops(ops)),
                        Box::new(SoftDriver::new()),
                        Arc::new(NullSink),
                        ReplayConfig::default(),
                    );
                    assert_eq!(report.stats.frames, FRAMES);
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_callset(c: &mut Criterion) {
    use retrace_rs::callset::CallSet;
    use retrace_rs::trace::Call;

    let set: CallSet = "1-100,500-600,1000-".parse().unwrap();
    let calls: Vec<Call> = (0..4096)
        .map(|no| Call::new(no, 0, CallOp::Present))
        .collect();

    c.bench_function("callset_contains_4096", |b| {
        b.iter(|| {
            let mut hits = 0u32;
            for call in &calls {
                if set.contains(call) {
                    hits += 1;
                }
            }
            criterion::black_box(hits)
        });
    });
}

criterion_group!(benches, bench_replay, bench_callset);
criterion_main!(benches);
