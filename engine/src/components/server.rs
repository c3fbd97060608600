//! Single-item server

use crate::components::service::{LinkedService, ServiceCore, StepOutcome};
use crate::core::error::{SimError, SimResult};
use crate::models::{ComponentId, ItemId, QueueId};
use crate::orchestrator::Simulation;
use crate::providers::{EvalContext, Sample, StringSample};

/// Takes the first item (for its match value) from its wait queue, holds
/// it for the service time and sends it on
pub struct Server {
    service: ServiceCore,
    wait_queue: QueueId,
    service_time: Sample,
    current: Option<ItemId>,
}

impl Server {
    pub fn new(wait_queue: QueueId, service_time: Sample) -> Self {
        Self {
            service: ServiceCore::new(),
            wait_queue,
            service_time,
            current: None,
        }
    }

    /// Only serve items with this match value
    pub fn with_match(mut self, provider: StringSample) -> Self {
        self.service.set_match_provider(provider);
        self
    }

    pub fn wait_queue(&self) -> QueueId {
        self.wait_queue
    }

    /// Item in service
    pub fn current(&self) -> Option<ItemId> {
        self.current
    }
}

impl LinkedService for Server {
    fn service(&self) -> &ServiceCore {
        &self.service
    }

    fn service_mut(&mut self) -> &mut ServiceCore {
        &mut self.service
    }

    fn is_ready_to_start(&mut self, sim: &Simulation, _id: ComponentId) -> SimResult<bool> {
        let m = self.service.cycle_match(sim);
        Ok(sim.queue(self.wait_queue)?.match_count(m.as_deref()) > 0)
    }

    fn start_processing(&mut self, sim: &mut Simulation, _id: ComponentId) -> SimResult<bool> {
        let m = self.service.current_match().map(str::to_string);
        if sim.queue(self.wait_queue)?.match_count(m.as_deref()) == 0 {
            return Ok(false);
        }
        self.current = sim.queue_remove_first_for_match(self.wait_queue, m.as_deref())?;
        Ok(self.current.is_some())
    }

    fn step_duration(&mut self, sim: &Simulation, _id: ComponentId) -> SimResult<f64> {
        Ok(self.service_time.next_sample(&EvalContext::new(sim, self.current)))
    }

    fn process_step(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<StepOutcome> {
        let item = self.current.take().ok_or_else(|| {
            SimError::precondition(sim.component_name(id), "process_step", "no item in service")
        })?;
        sim.send_to_next(id, item)?;
        Ok(StepOutcome::Released)
    }
}
