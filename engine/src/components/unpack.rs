//! Emptying containers
//!
//! An [`Unpack`] takes a container from its wait queue and sends its
//! contents on one item per service-time step, optionally only the items
//! whose match value equals `match_for_entities`. Once the last of those
//! items has left, the container and anything still inside it are
//! destroyed.

use crate::components::service::{LinkedService, ServiceCore, StepOutcome};
use crate::core::error::{SimError, SimResult};
use crate::models::{ComponentId, ItemId, QueueId};
use crate::orchestrator::Simulation;
use crate::providers::{plain_string, EvalContext, Sample, StringSample};

/// Sends the contents of containers on, one item per step
pub struct Unpack {
    service: ServiceCore,
    wait_queue: QueueId,
    service_time: Sample,
    match_for_entities: Option<StringSample>,

    container: Option<ItemId>,
    entity_match: Option<String>,
    number_to_remove: usize,
    number_removed: usize,
}

impl Unpack {
    pub fn new(wait_queue: QueueId, service_time: Sample) -> Self {
        Self {
            service: ServiceCore::new(),
            wait_queue,
            service_time,
            match_for_entities: None,
            container: None,
            entity_match: None,
            number_to_remove: 0,
            number_removed: 0,
        }
    }

    /// Only take containers with this match value
    pub fn with_match(mut self, provider: StringSample) -> Self {
        self.service.set_match_provider(provider);
        self
    }

    /// Only unpack contents with this match value, evaluated per container
    pub fn with_match_for_entities(mut self, provider: StringSample) -> Self {
        self.match_for_entities = Some(provider);
        self
    }

    pub fn wait_queue(&self) -> QueueId {
        self.wait_queue
    }

    /// Container being emptied
    pub fn container(&self) -> Option<ItemId> {
        self.container
    }

    fn destroy_container(&mut self, sim: &mut Simulation, container: ItemId) -> SimResult<()> {
        self.container = None;
        self.entity_match = None;
        self.number_to_remove = 0;
        self.number_removed = 0;
        sim.destroy_item(container)
    }
}

impl LinkedService for Unpack {
    fn service(&self) -> &ServiceCore {
        &self.service
    }

    fn service_mut(&mut self) -> &mut ServiceCore {
        &mut self.service
    }

    fn is_ready_to_start(&mut self, sim: &Simulation, _id: ComponentId) -> SimResult<bool> {
        if self.container.is_some() {
            return Ok(true);
        }
        let m = self.service.cycle_match(sim);
        Ok(sim.queue(self.wait_queue)?.match_count(m.as_deref()) > 0)
    }

    fn start_processing(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<bool> {
        if self.container.is_some() {
            return Ok(true);
        }
        let m = self.service.current_match().map(str::to_string);
        if sim.queue(self.wait_queue)?.match_count(m.as_deref()) == 0 {
            return Ok(false);
        }
        let Some(container) = sim.queue_remove_first_for_match(self.wait_queue, m.as_deref())? else {
            return Ok(false);
        };
        if !sim.item(container)?.is_container() {
            return Err(SimError::precondition(
                sim.component_name(id),
                "start_processing",
                format!("{} is not a container", container),
            ));
        }

        let ctx = EvalContext::new(sim, Some(container));
        self.entity_match = self
            .match_for_entities
            .as_ref()
            .map(|p| plain_string(p.as_ref(), &ctx));
        self.number_to_remove = sim.container_count(container, self.entity_match.as_deref())?;
        self.number_removed = 0;
        self.container = Some(container);
        Ok(true)
    }

    fn step_duration(&mut self, sim: &Simulation, _id: ComponentId) -> SimResult<f64> {
        Ok(self.service_time.next_sample(&EvalContext::new(sim, self.container)))
    }

    fn process_step(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<StepOutcome> {
        let container = self.container.ok_or_else(|| {
            SimError::precondition(sim.component_name(id), "process_step", "no container")
        })?;

        if self.number_removed < self.number_to_remove {
            if let Some(item) = sim.container_remove(container, self.entity_match.as_deref())? {
                self.number_removed += 1;
                sim.send_to_next(id, item)?;
            }
        }

        let exhausted = self.number_removed >= self.number_to_remove
            || sim.container_count(container, self.entity_match.as_deref())? == 0;
        if !exhausted {
            return Ok(StepOutcome::Continue);
        }
        self.destroy_container(sim, container)?;
        Ok(StepOutcome::Released)
    }
}
