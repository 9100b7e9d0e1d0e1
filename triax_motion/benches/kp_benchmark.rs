//! Proportional controller micro-benchmark.
//!
//! Measures one control tick in the clamped region, at the drive floor
//! and through a full simulated approach.

use criterion::{Criterion, criterion_group, criterion_main};

use triax_motion::kp::{ControlAction, PControl, Tunings};

fn reference_tunings() -> Tunings {
    Tunings {
        kp: 100,
        action: ControlAction::Direct,
        update_ms: 100,
        min_out: -100_000,
        max_out: 100_000,
        abs_min_out: 10_000,
    }
}

fn bench_run_clamped(c: &mut Criterion) {
    let mut kp = PControl::new(reference_tunings());
    c.bench_function("kp_run_clamped", |b| {
        b.iter(|| kp.run(1_500_000, 0));
    });
}

fn bench_run_floored(c: &mut Criterion) {
    let mut kp = PControl::new(reference_tunings());
    c.bench_function("kp_run_floored", |b| {
        b.iter(|| kp.run(5, 0));
    });
}

fn bench_full_approach(c: &mut Criterion) {
    c.bench_function("kp_full_approach", |b| {
        b.iter(|| {
            let mut kp = PControl::new(reference_tunings());
            kp.restart(0);
            let target = 1500;
            let mut pos = 0;
            while (target - pos).abs() >= 2 {
                let out = kp.run(target, pos);
                pos += out.signum();
            }
            pos
        });
    });
}

criterion_group!(benches, bench_run_clamped, bench_run_floored, bench_full_approach);
criterion_main!(benches);
