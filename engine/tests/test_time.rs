//! Tests for the virtual clock and tick conversion

use flow_simulator_core_rs::{SimConfig, SimError, SimTime, Simulation, TimeBase};

#[test]
fn test_time_base_round_trip_whole_seconds() {
    let base = TimeBase::new(1000.0);
    assert_eq!(base.seconds_to_ticks(3.0), Some(3000));
    assert_eq!(base.ticks_to_seconds(3000), 3.0);
    assert_eq!(base.time_to_seconds(SimTime::new(500)), 0.5);
}

#[test]
fn test_default_resolution_is_microseconds() {
    let base = TimeBase::default();
    assert_eq!(base.ticks_per_second(), 1_000_000.0);
    assert_eq!(base.seconds_to_ticks(0.000_001), Some(1));
}

#[test]
fn test_negative_duration_rejected() {
    let base = TimeBase::new(1.0);
    assert_eq!(base.seconds_to_ticks(-0.5), None);
}

#[test]
fn test_sim_time_ordering() {
    assert!(SimTime::ZERO < SimTime::new(1));
    assert_eq!(SimTime::new(u64::MAX).plus(1), None);
    assert_eq!(SimTime::new(7).to_string(), "t=7");
}

#[test]
fn test_simulation_clock_starts_at_zero() {
    let sim = Simulation::new(SimConfig::default()).unwrap();
    assert_eq!(sim.now(), SimTime::ZERO);
    assert_eq!(sim.now_seconds(), 0.0);
}

#[test]
fn test_run_until_advances_idle_clock() {
    let mut sim = Simulation::new(SimConfig {
        ticks_per_second: 10.0,
        rng_seed: 1,
    })
    .unwrap();

    sim.run_until_seconds(2.5).unwrap();
    assert_eq!(sim.now(), SimTime::new(25));
    assert_eq!(sim.now_seconds(), 2.5);
}

#[test]
fn test_run_until_past_time_is_non_causal() {
    let mut sim = Simulation::new(SimConfig {
        ticks_per_second: 1.0,
        rng_seed: 1,
    })
    .unwrap();

    sim.run_until(SimTime::new(10)).unwrap();
    let err = sim.run_until(SimTime::new(5)).unwrap_err();
    assert!(matches!(err, SimError::NonCausal { .. }));
    assert_eq!(sim.now(), SimTime::new(10));
}

#[test]
fn test_run_until_negative_seconds_rejected() {
    let mut sim = Simulation::new(SimConfig::default()).unwrap();
    let err = sim.run_until_seconds(-1.0).unwrap_err();
    assert!(matches!(err, SimError::InvalidDuration(_)));
}
