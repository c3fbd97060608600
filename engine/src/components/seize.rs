//! Resource acquisition and return
//!
//! A [`Seize`] is instantaneous: each time it is notified it passes on
//! as many waiting items as it can, seizing its units for each one. The
//! units stay seized while the item travels downstream until a
//! [`Release`] returns them.
//!
//! When several seizers wait on the same resource, a release serves them
//! in order of the priority of their first waiting item, then the
//! longest-waiting item, then declaration order.

use crate::components::service::{self, LinkedService, ServiceCore, ServiceState, StepOutcome};
use crate::core::error::{SimError, SimResult};
use crate::core::time::SimTime;
use crate::models::{ComponentId, ItemId, QueueId, ResourceId};
use crate::orchestrator::Simulation;
use crate::providers::StringSample;

/// Seizes units of one or more resources for each item it passes on
pub struct Seize {
    service: ServiceCore,
    wait_queue: QueueId,
    resources: Vec<ResourceId>,
    units: Vec<u32>,
    current: Option<ItemId>,
}

impl Seize {
    /// `units[i]` units of `resources[i]` are seized per item
    pub fn new(wait_queue: QueueId, resources: Vec<ResourceId>, units: Vec<u32>) -> Self {
        Self {
            service: ServiceCore::new(),
            wait_queue,
            resources,
            units,
            current: None,
        }
    }

    /// Only pass on items with this match value
    pub fn with_match(mut self, provider: StringSample) -> Self {
        self.service.set_match_provider(provider);
        self
    }

    pub fn wait_queue(&self) -> QueueId {
        self.wait_queue
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn units(&self) -> &[u32] {
        &self.units
    }

    fn resources_available(&self, sim: &Simulation) -> SimResult<bool> {
        for (r, n) in self.resources.iter().zip(&self.units) {
            if sim.resource(*r)?.available_units() < *n {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `(priority, arrival time)` of the first waiting item if this seizer
    /// could start now
    pub(crate) fn candidate(&mut self, sim: &Simulation, id: ComponentId) -> SimResult<Option<(i32, SimTime)>> {
        if !self.service.is_idle() || !self.service.is_open() || !self.is_ready_to_start(sim, id)? {
            return Ok(None);
        }
        let queue = sim.queue(self.wait_queue)?;
        Ok(queue
            .first_for_match(self.service.current_match())
            .map(|e| (e.priority(), e.time_added)))
    }

    /// Pass on waiting items while ready; returns how many were passed on
    pub(crate) fn serve(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<usize> {
        let mut served = 0;
        while self.serve_one(sim, id)? {
            served += 1;
        }
        Ok(served)
    }

    /// Run one instantaneous cycle if ready
    pub(crate) fn serve_one(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<bool> {
        if !self.service.is_idle() || !self.service.is_open() || !self.is_ready_to_start(sim, id)? {
            return Ok(false);
        }
        service::transition(self, sim, id, ServiceState::Starting)?;
        if !self.start_processing(sim, id)? {
            service::transition(self, sim, id, ServiceState::Idle)?;
            return Ok(false);
        }
        self.process_step(sim, id)?;
        service::transition(self, sim, id, ServiceState::Releasing)?;
        self.service.end_cycle();
        service::transition(self, sim, id, ServiceState::Idle)?;
        Ok(true)
    }
}

impl LinkedService for Seize {
    fn service(&self) -> &ServiceCore {
        &self.service
    }

    fn service_mut(&mut self) -> &mut ServiceCore {
        &mut self.service
    }

    fn is_ready_to_start(&mut self, sim: &Simulation, _id: ComponentId) -> SimResult<bool> {
        let m = self.service.cycle_match(sim);
        if sim.queue(self.wait_queue)?.match_count(m.as_deref()) == 0 {
            return Ok(false);
        }
        self.resources_available(sim)
    }

    fn start_processing(&mut self, sim: &mut Simulation, _id: ComponentId) -> SimResult<bool> {
        let m = self.service.current_match().map(str::to_string);
        if sim.queue(self.wait_queue)?.match_count(m.as_deref()) == 0 || !self.resources_available(sim)? {
            return Ok(false);
        }
        self.current = sim.queue_remove_first_for_match(self.wait_queue, m.as_deref())?;
        if self.current.is_none() {
            return Ok(false);
        }
        for (r, n) in self.resources.iter().zip(&self.units) {
            sim.resource_seize(*r, *n)?;
        }
        Ok(true)
    }

    fn step_duration(&mut self, _sim: &Simulation, _id: ComponentId) -> SimResult<f64> {
        Ok(0.0)
    }

    fn process_step(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<StepOutcome> {
        let item = self.current.take().ok_or_else(|| {
            SimError::precondition(sim.component_name(id), "process_step", "no item seized")
        })?;
        sim.send_to_next(id, item)?;
        Ok(StepOutcome::Released)
    }
}

/// Returns units of one or more resources for each item it receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    resources: Vec<ResourceId>,
    units: Vec<u32>,
}

impl Release {
    pub fn new(resources: Vec<ResourceId>, units: Vec<u32>) -> Self {
        Self { resources, units }
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn units(&self) -> &[u32] {
        &self.units
    }

    pub(crate) fn receive(&mut self, sim: &mut Simulation, id: ComponentId, item: ItemId) -> SimResult<()> {
        for (r, n) in self.resources.iter().zip(&self.units) {
            sim.resource_release(*r, *n)?;
        }
        sim.send_to_next(id, item)
    }
}
