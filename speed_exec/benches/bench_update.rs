//! # Chassis Update Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use comms_if::speed::{Gear, OperatingState};
use speed_lib::{
    actuator::sim::{SimParams, SimVehicle},
    chassis::{Chassis, ChassisParams},
};
use util::time::ManualClock;

fn update_benchmark(c: &mut Criterion) {
    // ---- Bring a simulated vehicle up to Run ----

    let vehicle = SimVehicle::new(SimParams::default());
    let clock = ManualClock::new(1.0);
    let mut chassis = Chassis::new(
        ChassisParams::default(),
        vehicle.actuators(),
        Box::new(clock.clone()),
    )
    .unwrap();

    vehicle.set_gear(Gear::Low);

    for _ in 0..200 {
        clock.advance(0.1);
        chassis.update();
        match chassis.state() {
            OperatingState::Run => break,
            s if s < OperatingState::Idle => chassis.set_state(OperatingState::Idle),
            _ => chassis.set_state(OperatingState::Run),
        };
    }
    assert_eq!(chassis.state(), OperatingState::Run);

    // Bench one full control cycle, the clock keeps time so no speed timeout is raised
    c.bench_function("Chassis::update + set_speed", |b| {
        b.iter(|| {
            clock.advance(0.1);
            chassis.update();
            chassis.set_speed(0.5, 2.0, 0.05);
            vehicle.step(0.1);
        })
    });
}

criterion_group!(benches, update_benchmark);
criterion_main!(benches);
