//! Packing items into containers
//!
//! A [`Pack`] creates a new container item `<name>_<n>` for each cycle,
//! waits until its wait queue holds `number_to_start` items for the
//! cycle's match value, then inserts `number_of_entities` of them one per
//! service-time step. The full container is sent on.
//!
//! A [`ConditionPack`] additionally evaluates a release condition, with
//! the container as the current item, after every insertion and sends
//! the container on early when it is non-zero.
//!
//! If the wait queue runs dry mid-container, the pack parks in `Idle`
//! with its partly filled container and resumes on the next arrival.

use crate::components::service::{LinkedService, ServiceCore, StepOutcome};
use crate::core::error::{SimError, SimResult};
use crate::models::{ComponentId, ItemId, QueueId};
use crate::orchestrator::Simulation;
use crate::providers::{EvalContext, Sample, StringSample};

fn as_count(value: f64) -> usize {
    if value.is_finite() && value >= 1.0 {
        value.trunc() as usize
    } else {
        1
    }
}

/// Packs items from a wait queue into new containers
pub struct Pack {
    service: ServiceCore,
    wait_queue: QueueId,
    number_of_entities: Sample,
    number_to_start: Option<Sample>,
    service_time: Sample,
    release_condition: Option<Sample>,
    container_fifo: bool,

    // Current container
    container: Option<ItemId>,
    number_to_insert: usize,
    number_inserted: usize,
    start_threshold: Option<usize>,
    started_packing: bool,
    packing: Option<ItemId>,
    containers_made: u64,
}

impl Pack {
    pub fn new(wait_queue: QueueId, number_of_entities: Sample, service_time: Sample) -> Self {
        Self {
            service: ServiceCore::new(),
            wait_queue,
            number_of_entities,
            number_to_start: None,
            service_time,
            release_condition: None,
            container_fifo: true,
            container: None,
            number_to_insert: 0,
            number_inserted: 0,
            start_threshold: None,
            started_packing: false,
            packing: None,
            containers_made: 0,
        }
    }

    /// Items that must be waiting before a new container is started
    /// (defaults to the container size)
    pub fn with_number_to_start(mut self, number_to_start: Sample) -> Self {
        self.number_to_start = Some(number_to_start);
        self
    }

    /// Only pack items with this match value; containers hold one value each
    pub fn with_match(mut self, provider: StringSample) -> Self {
        self.service.set_match_provider(provider);
        self
    }

    /// Order contents newest first
    pub fn with_lifo_containers(mut self) -> Self {
        self.container_fifo = false;
        self
    }

    pub fn wait_queue(&self) -> QueueId {
        self.wait_queue
    }

    /// Container being filled
    pub fn container(&self) -> Option<ItemId> {
        self.container
    }

    pub fn number_inserted(&self) -> usize {
        self.number_inserted
    }

    pub fn containers_made(&self) -> u64 {
        self.containers_made
    }

    fn available(&mut self, sim: &Simulation) -> SimResult<usize> {
        let m = self.service.cycle_match(sim);
        Ok(sim.queue(self.wait_queue)?.match_count(m.as_deref()))
    }

    fn create_container(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<ItemId> {
        self.containers_made += 1;
        let creator = sim.component_name(id);
        let container = sim.create_item_by(format!("{}_{}", creator, self.containers_made), &creator);
        sim.make_container(container, self.container_fifo)?;
        let state = sim.component_core(id)?.state_assignment().map(str::to_string);
        if state.is_some() {
            sim.set_item_state(container, state)?;
        }

        let ctx = EvalContext::new(sim, Some(container));
        self.number_to_insert = as_count(self.number_of_entities.next_sample(&ctx));
        self.number_inserted = 0;
        self.container = Some(container);
        Ok(container)
    }

    fn should_release(&self, sim: &Simulation, container: ItemId) -> bool {
        if self.number_inserted >= self.number_to_insert {
            return true;
        }
        match &self.release_condition {
            Some(cond) => cond.next_sample(&EvalContext::new(sim, Some(container))) != 0.0,
            None => false,
        }
    }
}

impl LinkedService for Pack {
    fn service(&self) -> &ServiceCore {
        &self.service
    }

    fn service_mut(&mut self) -> &mut ServiceCore {
        &mut self.service
    }

    fn is_ready_to_start(&mut self, sim: &Simulation, _id: ComponentId) -> SimResult<bool> {
        let available = self.available(sim)?;
        if self.started_packing {
            return Ok(available >= 1);
        }
        let threshold = match self.start_threshold {
            Some(n) => n,
            None => {
                let ctx = EvalContext::new(sim, None);
                let provider = self.number_to_start.as_ref().unwrap_or(&self.number_of_entities);
                let n = as_count(provider.next_sample(&ctx));
                self.start_threshold = Some(n);
                n
            }
        };
        Ok(available >= threshold)
    }

    fn start_processing(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<bool> {
        let m = self.service.current_match().map(str::to_string);
        if sim.queue(self.wait_queue)?.match_count(m.as_deref()) == 0 {
            return Ok(false);
        }
        if self.container.is_none() {
            self.create_container(sim, id)?;
        }
        self.started_packing = true;
        self.packing = sim.queue_remove_first_for_match(self.wait_queue, m.as_deref())?;
        Ok(self.packing.is_some())
    }

    fn step_duration(&mut self, sim: &Simulation, _id: ComponentId) -> SimResult<f64> {
        Ok(self.service_time.next_sample(&EvalContext::new(sim, self.packing)))
    }

    fn process_step(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<StepOutcome> {
        let name = sim.component_name(id);
        let container = self
            .container
            .ok_or_else(|| SimError::precondition(name.as_str(), "process_step", "no container"))?;
        let item = self
            .packing
            .take()
            .ok_or_else(|| SimError::precondition(name.as_str(), "process_step", "no item to pack"))?;

        let m = self.service.current_match().map(str::to_string);
        sim.container_add(container, item, 0, m)?;
        self.number_inserted += 1;

        if !self.should_release(sim, container) {
            return Ok(StepOutcome::Continue);
        }
        self.container = None;
        self.started_packing = false;
        self.start_threshold = None;
        sim.send_to_next(id, container)?;
        Ok(StepOutcome::Released)
    }
}

/// [`Pack`] that also releases the container when a condition holds
pub struct ConditionPack {
    inner: Pack,
}

impl ConditionPack {
    /// `release_condition` is evaluated with the container as the current
    /// item after each insertion; non-zero releases the container
    pub fn new(
        wait_queue: QueueId,
        number_of_entities: Sample,
        service_time: Sample,
        release_condition: Sample,
    ) -> Self {
        let mut inner = Pack::new(wait_queue, number_of_entities, service_time);
        inner.release_condition = Some(release_condition);
        Self { inner }
    }

    pub fn with_number_to_start(self, number_to_start: Sample) -> Self {
        Self {
            inner: self.inner.with_number_to_start(number_to_start),
        }
    }

    pub fn with_match(self, provider: StringSample) -> Self {
        Self {
            inner: self.inner.with_match(provider),
        }
    }

    pub fn wait_queue(&self) -> QueueId {
        self.inner.wait_queue()
    }

    pub fn pack(&self) -> &Pack {
        &self.inner
    }
}

impl LinkedService for ConditionPack {
    fn service(&self) -> &ServiceCore {
        self.inner.service()
    }

    fn service_mut(&mut self) -> &mut ServiceCore {
        self.inner.service_mut()
    }

    fn is_ready_to_start(&mut self, sim: &Simulation, id: ComponentId) -> SimResult<bool> {
        self.inner.is_ready_to_start(sim, id)
    }

    fn start_processing(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<bool> {
        self.inner.start_processing(sim, id)
    }

    fn step_duration(&mut self, sim: &Simulation, id: ComponentId) -> SimResult<f64> {
        self.inner.step_duration(sim, id)
    }

    fn process_step(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<StepOutcome> {
        self.inner.process_step(sim, id)
    }
}
