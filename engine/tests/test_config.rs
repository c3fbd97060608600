//! Building simulations from JSON model descriptions

use flow_simulator_core_rs::{ModelConfig, SimError, SimResult, Simulation};

const CLINIC: &str = r#"{
  "simulation": { "ticks_per_second": 1, "rng_seed": 9 },
  "queues": [ { "name": "Lobby" }, { "name": "Line" } ],
  "resources": [ { "name": "Desk", "capacity": 1 } ],
  "components": [
    { "name": "Arrivals", "type": "generator", "next": "Admit",
      "inter_arrival": 1.0, "max_count": 5 },
    { "name": "Admit", "type": "seize", "next": "Counter",
      "wait_queue": "Lobby", "resources": ["Desk"], "units": [1] },
    { "name": "Counter", "type": "server", "next": "Leave",
      "wait_queue": "Line", "service_time": 2.0, "state_assignment": "seen" },
    { "name": "Leave", "type": "release", "next": "Exit",
      "resources": ["Desk"], "units": [1] },
    { "name": "Exit", "type": "sink" }
  ]
}"#;

fn build(json: &str) -> SimResult<Simulation> {
    ModelConfig::from_json(json).and_then(|config| Simulation::from_config(&config))
}

fn config_error(json: &str) -> String {
    match build(json) {
        Err(SimError::InvalidConfig(message)) => message,
        Err(other) => panic!("expected InvalidConfig, got {:?}", other),
        Ok(_) => panic!("model should have been rejected"),
    }
}

#[test]
fn test_seize_server_release_model() {
    let mut sim = build(CLINIC).unwrap();
    sim.run().unwrap();

    let report = sim.report().unwrap();
    assert_eq!(report.final_tick, 10);
    assert_eq!(report.items_created, 5);
    assert_eq!(report.items_alive, 0);
    assert!(!report.halted);
    assert!(report.error.is_none());

    let desk = &report.resources[0];
    assert_eq!(desk.name, "Desk");
    assert_eq!(desk.units_seized, 5);
    assert_eq!(desk.units_released, 5);
    assert_eq!(desk.units_in_use, 0);
    assert!((desk.utilisation - 1.0).abs() < 1e-9);

    let names: Vec<&str> = report.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Arrivals", "Admit", "Counter", "Leave", "Exit"]);
    let exit = &report.components[4];
    assert_eq!(exit.kind, "Sink");
    assert_eq!(exit.number_processed, 5);
    assert_eq!(report.components[2].state.as_deref(), Some("Idle"));
    assert_eq!(report.event_count, sim.event_log().len());
}

#[test]
fn test_report_serializes_to_json() {
    let mut sim = build(CLINIC).unwrap();
    sim.run().unwrap();
    let json = sim.report().unwrap().to_json().unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["items_created"], 5);
    assert_eq!(value["queues"][0]["name"], "Lobby");
    assert_eq!(value["digest"].as_str().map(str::len), Some(64));
}

#[test]
fn test_same_model_same_digest() {
    let mut a = build(CLINIC).unwrap();
    let mut b = build(CLINIC).unwrap();
    a.run().unwrap();
    b.run().unwrap();

    let (ra, rb) = (a.report().unwrap(), b.report().unwrap());
    assert_eq!(ra.digest, rb.digest);
    assert_ne!(ra.run_id, rb.run_id);
}

#[test]
fn test_renege_to_sink() {
    let mut sim = build(
        r#"{
          "simulation": { "ticks_per_second": 1 },
          "queues": [ { "name": "Lobby",
                        "renege": { "time": 3, "destination": "Walkout" } } ],
          "components": [
            { "name": "Arrivals", "type": "generator", "next": "Lobby",
              "inter_arrival": 1, "max_count": 2 },
            { "name": "Walkout", "type": "sink" }
          ]
        }"#,
    )
    .unwrap();
    sim.run().unwrap();

    let report = sim.report().unwrap();
    assert_eq!(report.queues[0].number_reneged, 2);
    assert_eq!(report.components[1].number_processed, 2);
    assert_eq!(report.items_alive, 0);
    assert_eq!(report.final_tick, 4);
}

#[test]
fn test_pack_and_unpack_from_json() {
    let mut sim = build(
        r#"{
          "simulation": { "ticks_per_second": 10 },
          "queues": [ { "name": "Parts", "match_value": ["odd", "even"] }, { "name": "Boxes" } ],
          "components": [
            { "name": "Arrivals", "type": "generator", "next": "Boxer",
              "inter_arrival": 1, "max_count": 4 },
            { "name": "Boxer", "type": "pack", "next": "Opener",
              "wait_queue": "Parts", "number_of_entities": 2, "service_time": 0.5,
              "match_value": "odd" },
            { "name": "Opener", "type": "unpack", "next": "Exit",
              "wait_queue": "Boxes", "service_time": 0.1 },
            { "name": "Exit", "type": "sink" }
          ]
        }"#,
    )
    .unwrap();
    sim.run().unwrap();

    let report = sim.report().unwrap();
    // Only the two "odd" parts are packed; the "even" ones stay queued
    assert_eq!(report.components[3].number_processed, 2);
    assert_eq!(report.queues[0].length, 2);
    assert_eq!(sim.event_log().events_of_type("Packed").len(), 2);
}

#[test]
fn test_round_trip_preserves_model() {
    let config = ModelConfig::from_json(CLINIC).unwrap();
    let again = ModelConfig::from_json(&config.to_json().unwrap()).unwrap();
    assert_eq!(config, again);
}

#[test]
fn test_rejects_malformed_json() {
    assert!(config_error("{ not json").contains("parse"));
}

#[test]
fn test_rejects_unknown_component_type() {
    let message = config_error(
        r#"{ "components": [ { "name": "X", "type": "teleporter" } ] }"#,
    );
    assert!(message.contains("parse"));
}

#[test]
fn test_rejects_empty_model() {
    config_error(r#"{ "components": [] }"#);
}

#[test]
fn test_rejects_duplicate_names() {
    let message = config_error(
        r#"{
          "queues": [ { "name": "Exit" } ],
          "components": [ { "name": "Exit", "type": "sink" } ]
        }"#,
    );
    assert!(message.contains("duplicate"));
}

#[test]
fn test_rejects_unknown_queue() {
    let message = config_error(
        r#"{ "components": [
          { "name": "Desk", "type": "server", "next": "Exit",
            "wait_queue": "Nowhere", "service_time": 1 },
          { "name": "Exit", "type": "sink" } ] }"#,
    );
    assert!(message.contains("unknown queue"));
}

#[test]
fn test_rejects_unknown_next() {
    let message = config_error(
        r#"{ "components": [
          { "name": "Arrivals", "type": "generator", "next": "Nowhere", "inter_arrival": 1 } ] }"#,
    );
    assert!(message.contains("unknown destination"));
}

#[test]
fn test_rejects_missing_next() {
    let message = config_error(
        r#"{ "components": [ { "name": "Arrivals", "type": "generator", "inter_arrival": 1 } ] }"#,
    );
    assert!(message.contains("missing next"));
}

#[test]
fn test_rejects_units_beyond_capacity() {
    let message = config_error(
        r#"{
          "queues": [ { "name": "Lobby" } ],
          "resources": [ { "name": "Desk", "capacity": 1 } ],
          "components": [
            { "name": "Admit", "type": "seize", "next": "Exit",
              "wait_queue": "Lobby", "resources": ["Desk"], "units": [2] },
            { "name": "Exit", "type": "sink" } ] }"#,
    );
    assert!(message.contains("capacity"));
}

#[test]
fn test_rejects_unit_count_mismatch() {
    let message = config_error(
        r#"{
          "resources": [ { "name": "Desk", "capacity": 1 } ],
          "components": [
            { "name": "Leave", "type": "release", "next": "Exit",
              "resources": ["Desk"], "units": [] },
            { "name": "Exit", "type": "sink" } ] }"#,
    );
    assert!(message.contains("unit counts"));
}

#[test]
fn test_rejects_bad_distribution() {
    let message = config_error(
        r#"{ "components": [
          { "name": "Arrivals", "type": "generator", "next": "Exit",
            "inter_arrival": { "dist": "exponential", "mean": 0 } },
          { "name": "Exit", "type": "sink" } ] }"#,
    );
    assert!(message.contains("mean"));
}

#[test]
fn test_rejects_zero_tick_rate() {
    config_error(
        r#"{ "simulation": { "ticks_per_second": 0 },
             "components": [ { "name": "Exit", "type": "sink" } ] }"#,
    );
}
