//! Hot-path microbenchmarks: request expansion, task-chain maintenance,
//! watchdog check and phase wrapping. These all run inside the control
//! tick, so they must stay allocation-free and far below the tick budget.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use foc_axis::supervisor::expand_request;
use foc_axis::task_chain::TaskChain;
use foc_axis::watchdog::Watchdog;
use foc_common::axis::config::AxisConfig;
use foc_common::axis::state::AxisState;
use foc_common::math::wrap_pm_pi;

fn bench_expand_request(c: &mut Criterion) {
    let config = AxisConfig {
        startup_motor_calibration: true,
        startup_encoder_index_search: true,
        startup_encoder_offset_calibration: true,
        startup_closed_loop_control: true,
        ..Default::default()
    };
    c.bench_function("expand_startup_sequence", |b| {
        b.iter(|| expand_request(black_box(AxisState::StartupSequence), &config, true))
    });
}

fn bench_task_chain(c: &mut Criterion) {
    c.bench_function("task_chain_load_advance", |b| {
        let mut chain = TaskChain::new();
        let states = [
            AxisState::MotorCalibration,
            AxisState::EncoderOffsetCalibration,
            AxisState::ClosedLoopControl,
            AxisState::Idle,
        ];
        b.iter(|| {
            chain.load(black_box(&states));
            while !chain.is_empty() {
                chain.advance();
            }
        })
    });
}

fn bench_watchdog_check(c: &mut Criterion) {
    let wd = Watchdog::new();
    wd.update_settings(1.0, 8000);
    c.bench_function("watchdog_check", |b| {
        b.iter(|| {
            wd.feed();
            black_box(wd.check())
        })
    });
}

fn bench_wrap_pm_pi(c: &mut Criterion) {
    c.bench_function("wrap_pm_pi", |b| {
        let mut x = 0.0f32;
        b.iter(|| {
            x += 0.37;
            black_box(wrap_pm_pi(x))
        })
    });
}

criterion_group!(
    benches,
    bench_expand_request,
    bench_task_chain,
    bench_watchdog_check,
    bench_wrap_pm_pi
);
criterion_main!(benches);
