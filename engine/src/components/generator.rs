//! Entry and exit points of the model
//!
//! A [`Generator`] creates items named `<generator>_<n>` and sends them
//! to its next component; a [`Sink`] destroys whatever reaches it.

use crate::core::error::SimResult;
use crate::events::{Action, EventHandle, Priority};
use crate::models::{ComponentId, ItemId};
use crate::orchestrator::Simulation;
use crate::providers::{EvalContext, Sample};

/// Creates items at first-arrival, then inter-arrival, times
pub struct Generator {
    first_arrival: Option<Sample>,
    inter_arrival: Sample,
    max_count: Option<u64>,
    generated: u64,
    pending: Option<EventHandle>,
}

impl Generator {
    /// Generator whose first item arrives at time zero
    pub fn new(inter_arrival: Sample) -> Self {
        Self {
            first_arrival: None,
            inter_arrival,
            max_count: None,
            generated: 0,
            pending: None,
        }
    }

    pub fn with_first_arrival(mut self, first_arrival: Sample) -> Self {
        self.first_arrival = Some(first_arrival);
        self
    }

    /// Stop after `max_count` items
    pub fn with_max_count(mut self, max_count: u64) -> Self {
        self.max_count = Some(max_count);
        self
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }

    /// Next arrival event, if one is scheduled
    pub fn pending(&self) -> Option<EventHandle> {
        self.pending
    }

    fn exhausted(&self) -> bool {
        self.max_count.is_some_and(|max| self.generated >= max)
    }

    fn schedule(&mut self, sim: &mut Simulation, id: ComponentId, secs: f64) -> SimResult<()> {
        if self.exhausted() {
            self.pending = None;
            return Ok(());
        }
        let handle = sim.schedule_seconds(secs, Priority::Normal, true, Action::Generate(id))?;
        self.pending = Some(handle);
        Ok(())
    }

    pub(crate) fn start(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<()> {
        let secs = self
            .first_arrival
            .as_ref()
            .map_or(0.0, |s| s.next_sample(&EvalContext::new(sim, None)));
        self.schedule(sim, id, secs)
    }

    pub(crate) fn generate(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<()> {
        self.pending = None;
        self.generated += 1;

        let creator = sim.component_core(id)?.name().to_string();
        let item = sim.create_item_by(format!("{}_{}", creator, self.generated), &creator);
        sim.record_received(id, item)?;
        sim.send_to_next(id, item)?;

        let secs = self
            .inter_arrival
            .next_sample(&EvalContext::new(sim, Some(item)));
        self.schedule(sim, id, secs)
    }
}

/// Destroys every item it receives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sink;

impl Sink {
    pub(crate) fn receive(&mut self, sim: &mut Simulation, id: ComponentId, item: ItemId) -> SimResult<()> {
        let now = sim.now();
        sim.component_core_mut(id)?.record_processed(now);
        sim.destroy_item(item)
    }
}
