//! End-of-run summary
//!
//! A [`RunReport`] is a plain serializable snapshot of the counters and
//! statistics a run produced. Its `run_id` is fresh for every report;
//! everything else, including the event-log digest, is identical for two
//! runs of the same model with the same seed.

use crate::core::error::{SimError, SimResult};
use crate::orchestrator::Simulation;
use serde::Serialize;
use uuid::Uuid;

/// Per-queue statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSummary {
    pub name: String,
    pub length: usize,
    pub number_added: u64,
    pub number_removed: u64,
    pub number_reneged: u64,
    pub average_length: f64,
    pub max_length: u64,
}

/// Per-resource statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSummary {
    pub name: String,
    pub capacity: u32,
    pub units_in_use: u32,
    pub units_seized: u64,
    pub units_released: u64,
    /// Time-weighted mean units in use divided by capacity
    pub utilisation: f64,
}

/// Per-component counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentSummary {
    pub name: String,
    pub kind: String,
    pub number_added: u64,
    pub number_processed: u64,
    pub number_in_progress: u64,
    /// Service state, for service components
    pub state: Option<String>,
}

/// Summary of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub final_tick: u64,
    pub final_seconds: f64,
    pub events_fired: u64,
    pub halted: bool,
    /// Message of the error that halted the run
    pub error: Option<String>,
    pub items_created: u64,
    pub items_alive: usize,
    pub queues: Vec<QueueSummary>,
    pub resources: Vec<ResourceSummary>,
    pub components: Vec<ComponentSummary>,
    pub event_count: usize,
    /// SHA-256 of the event log
    pub digest: String,
}

impl RunReport {
    pub fn from_simulation(sim: &Simulation) -> SimResult<Self> {
        let now = sim.now();

        let queues = sim
            .queues()
            .iter()
            .map(|q| QueueSummary {
                name: q.name().to_string(),
                length: q.len(),
                number_added: q.number_added(),
                number_removed: q.number_removed(),
                number_reneged: q.number_reneged(),
                average_length: q.average_length(now),
                max_length: q.max_length(),
            })
            .collect();

        let resources = sim
            .resources()
            .iter()
            .map(|r| ResourceSummary {
                name: r.name().to_string(),
                capacity: r.capacity(),
                units_in_use: r.units_in_use(),
                units_seized: r.units_seized(),
                units_released: r.units_released(),
                utilisation: if r.capacity() == 0 {
                    0.0
                } else {
                    r.average_in_use(now) / r.capacity() as f64
                },
            })
            .collect();

        let mut components = Vec::with_capacity(sim.component_count());
        for id in sim.component_ids() {
            let core = sim.component_core(id)?;
            let body = sim.component(id)?;
            components.push(ComponentSummary {
                name: core.name().to_string(),
                kind: body.kind().to_string(),
                number_added: core.number_added(),
                number_processed: core.number_processed(),
                number_in_progress: core.number_in_progress(),
                state: body.service_state().map(|s| s.to_string()),
            });
        }

        Ok(Self {
            run_id: Uuid::new_v4(),
            final_tick: now.ticks(),
            final_seconds: sim.now_seconds(),
            events_fired: sim.events_fired(),
            halted: sim.is_halted(),
            error: sim.halt_error().map(|e| e.to_string()),
            items_created: sim.items().created(),
            items_alive: sim.items().len(),
            queues,
            resources,
            components,
            event_count: sim.event_log().len(),
            digest: sim.event_log().digest()?,
        })
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> SimResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Serialization(e.to_string()))
    }
}
