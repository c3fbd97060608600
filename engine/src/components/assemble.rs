//! Joining items from several queues
//!
//! An [`Assemble`] waits until each of its wait queues holds its required
//! number of items, takes them, and after the service time sends a new
//! item `<name>_<n>` in their place. The consumed parts are destroyed.
//!
//! With `match_required`, all parts of one assembly share a match value,
//! chosen with [`select_match_value`]. Otherwise the cycle's own match
//! value (if any) applies to every queue.

use crate::components::service::{LinkedService, ServiceCore, StepOutcome};
use crate::core::error::{SimError, SimResult};
use crate::models::queue::required_at;
use crate::models::{select_match_value, sufficient_entities, ComponentId, ItemId, Queue, QueueId};
use crate::orchestrator::Simulation;
use crate::providers::{EvalContext, Sample, StringSample};

/// Joins items from several wait queues into one new item
pub struct Assemble {
    service: ServiceCore,
    wait_queues: Vec<QueueId>,
    /// Items taken from each queue; the last entry applies to any
    /// further queues
    required: Vec<usize>,
    service_time: Sample,
    match_required: bool,

    selected: Option<String>,
    assembled: Option<ItemId>,
    made: u64,
}

impl Assemble {
    pub fn new(wait_queues: Vec<QueueId>, required: Vec<usize>, service_time: Sample) -> Self {
        Self {
            service: ServiceCore::new(),
            wait_queues,
            required,
            service_time,
            match_required: false,
            selected: None,
            assembled: None,
            made: 0,
        }
    }

    /// Parts of one assembly must share a match value
    pub fn with_match_required(mut self) -> Self {
        self.match_required = true;
        self
    }

    /// Only assemble parts with this match value
    pub fn with_match(mut self, provider: StringSample) -> Self {
        self.service.set_match_provider(provider);
        self
    }

    pub fn wait_queues(&self) -> &[QueueId] {
        &self.wait_queues
    }

    pub fn required(&self) -> &[usize] {
        &self.required
    }

    pub fn is_match_required(&self) -> bool {
        self.match_required
    }

    /// Item being assembled
    pub fn assembled(&self) -> Option<ItemId> {
        self.assembled
    }

    pub fn made(&self) -> u64 {
        self.made
    }

    fn queues<'a>(&self, sim: &'a Simulation) -> SimResult<Vec<&'a Queue>> {
        self.wait_queues.iter().map(|q| sim.queue(*q)).collect()
    }
}

impl LinkedService for Assemble {
    fn service(&self) -> &ServiceCore {
        &self.service
    }

    fn service_mut(&mut self) -> &mut ServiceCore {
        &mut self.service
    }

    fn is_ready_to_start(&mut self, sim: &Simulation, _id: ComponentId) -> SimResult<bool> {
        let queues = self.queues(sim)?;
        if self.match_required {
            self.selected = select_match_value(&queues, &self.required);
            return Ok(self.selected.is_some());
        }
        let m = self.service.cycle_match(sim);
        let ready = sufficient_entities(&queues, &self.required, m.as_deref());
        self.selected = m;
        Ok(ready)
    }

    fn start_processing(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<bool> {
        let m = self.selected.clone();
        if !sufficient_entities(&self.queues(sim)?, &self.required, m.as_deref()) {
            return Ok(false);
        }

        let name = sim.component_name(id);
        for (i, q) in self.wait_queues.iter().enumerate() {
            for _ in 0..required_at(&self.required, i) {
                let part = sim.queue_remove_first_for_match(*q, m.as_deref())?.ok_or_else(|| {
                    SimError::precondition(name.as_str(), "start_processing", format!("{} ran out of parts", q))
                })?;
                sim.destroy_item(part)?;
            }
        }

        self.made += 1;
        self.assembled = Some(sim.create_item_by(format!("{}_{}", name, self.made), &name));
        Ok(true)
    }

    fn step_duration(&mut self, sim: &Simulation, _id: ComponentId) -> SimResult<f64> {
        Ok(self.service_time.next_sample(&EvalContext::new(sim, self.assembled)))
    }

    fn process_step(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<StepOutcome> {
        let item = self.assembled.take().ok_or_else(|| {
            SimError::precondition(sim.component_name(id), "process_step", "nothing assembled")
        })?;
        self.selected = None;
        sim.send_to_next(id, item)?;
        Ok(StepOutcome::Released)
    }
}
