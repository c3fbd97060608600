//! Process-flow components
//!
//! Components move items between queues and resources. The family is a
//! closed set of variants collected in [`Component`]; each variant holds
//! only indices into the simulation's queue and resource tables, never
//! the primitives themselves.
//!
//! | Variant         | Input            | Behaviour                                   |
//! |-----------------|------------------|---------------------------------------------|
//! | `Generator`     | none             | creates items on a schedule                 |
//! | `Server`        | wait queue       | holds one item for its service time         |
//! | `Seize`         | wait queue       | seizes units and passes items on at once    |
//! | `Release`       | direct           | returns units and passes items on           |
//! | `Pack`          | wait queue       | packs items into new containers             |
//! | `ConditionPack` | wait queue       | `Pack` with an early-release condition      |
//! | `Unpack`        | wait queue       | empties containers one item per step        |
//! | `Assemble`      | several queues   | joins items from several queues into one    |
//! | `Sink`          | direct           | destroys items                              |
//!
//! Bookkeeping common to every variant (next destination, state
//! assignment, counters) lives in a [`ComponentCore`] that the simulation
//! keeps next to the variant.

pub mod assemble;
pub mod generator;
pub mod pack;
pub mod seize;
pub mod server;
pub mod service;
pub mod unpack;

pub use assemble::Assemble;
pub use generator::{Generator, Sink};
pub use pack::{ConditionPack, Pack};
pub use seize::{Release, Seize};
pub use server::Server;
pub use service::{LinkedService, ServiceCore, ServiceState, StepOutcome};
pub use unpack::Unpack;

use crate::core::error::{SimError, SimResult};
use crate::core::time::SimTime;
use crate::models::{ComponentId, Destination, ItemId, QueueId, ResourceId};
use crate::orchestrator::Simulation;

// ============================================================================
// Shared bookkeeping
// ============================================================================

/// Bookkeeping shared by every component
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentCore {
    name: String,
    next: Option<Destination>,
    /// State given to every received item
    state_assignment: Option<String>,
    number_added: u64,
    number_processed: u64,
    received: Option<ItemId>,
    release_time: Option<SimTime>,
}

impl ComponentCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next: None,
            state_assignment: None,
            number_added: 0,
            number_processed: 0,
            received: None,
            release_time: None,
        }
    }

    pub fn with_next(mut self, next: Destination) -> Self {
        self.next = Some(next);
        self
    }

    pub fn with_state_assignment(mut self, state: impl Into<String>) -> Self {
        self.state_assignment = Some(state.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next(&self) -> Option<Destination> {
        self.next
    }

    pub fn state_assignment(&self) -> Option<&str> {
        self.state_assignment.as_deref()
    }

    /// Items received (or created, for generators)
    pub fn number_added(&self) -> u64 {
        self.number_added
    }

    /// Items sent on (or destroyed, for sinks)
    pub fn number_processed(&self) -> u64 {
        self.number_processed
    }

    pub fn number_in_progress(&self) -> u64 {
        self.number_added.saturating_sub(self.number_processed)
    }

    /// Most recently received item
    pub fn received(&self) -> Option<ItemId> {
        self.received
    }

    /// Time the last item was sent on
    pub fn release_time(&self) -> Option<SimTime> {
        self.release_time
    }

    pub(crate) fn set_next(&mut self, next: Destination) {
        self.next = Some(next);
    }

    pub(crate) fn record_received(&mut self, item: ItemId) {
        self.number_added += 1;
        self.received = Some(item);
    }

    pub(crate) fn record_processed(&mut self, now: SimTime) {
        self.number_processed += 1;
        self.release_time = Some(now);
    }

    pub(crate) fn clear_statistics(&mut self) {
        self.number_added = 0;
        self.number_processed = 0;
    }
}

/// How a component accepts items sent to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Input {
    /// Forwarded into the component's wait queue
    WaitQueue(QueueId),
    /// Handled immediately by the component
    Direct,
    /// Sending to the component is an error
    Rejected,
}

// ============================================================================
// Component variants
// ============================================================================

/// Closed set of process-flow components
pub enum Component {
    Generator(Generator),
    Server(Server),
    Seize(Seize),
    Release(Release),
    Pack(Pack),
    ConditionPack(ConditionPack),
    Unpack(Unpack),
    Assemble(Assemble),
    Sink(Sink),
}

macro_rules! component_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Component {
                fn from(c: $variant) -> Self {
                    Component::$variant(c)
                }
            }
        )*
    };
}

component_from!(Generator, Server, Seize, Release, Pack, ConditionPack, Unpack, Assemble, Sink);

fn config_error(name: &str, message: impl std::fmt::Display) -> SimError {
    SimError::InvalidConfig(format!("{}: {}", name, message))
}

impl Component {
    /// Variant name
    pub fn kind(&self) -> &'static str {
        match self {
            Component::Generator(_) => "Generator",
            Component::Server(_) => "Server",
            Component::Seize(_) => "Seize",
            Component::Release(_) => "Release",
            Component::Pack(_) => "Pack",
            Component::ConditionPack(_) => "ConditionPack",
            Component::Unpack(_) => "Unpack",
            Component::Assemble(_) => "Assemble",
            Component::Sink(_) => "Sink",
        }
    }

    pub(crate) fn input(&self) -> Input {
        match self {
            Component::Server(s) => Input::WaitQueue(s.wait_queue()),
            Component::Seize(s) => Input::WaitQueue(s.wait_queue()),
            Component::Pack(p) => Input::WaitQueue(p.wait_queue()),
            Component::ConditionPack(p) => Input::WaitQueue(p.wait_queue()),
            Component::Unpack(u) => Input::WaitQueue(u.wait_queue()),
            Component::Release(_) | Component::Sink(_) => Input::Direct,
            Component::Generator(_) | Component::Assemble(_) => Input::Rejected,
        }
    }

    /// Queues whose contents-changed notifications this component receives
    pub fn wait_queues(&self) -> Vec<QueueId> {
        match self {
            Component::Assemble(a) => a.wait_queues().to_vec(),
            other => match other.input() {
                Input::WaitQueue(q) => vec![q],
                _ => Vec::new(),
            },
        }
    }

    /// Resources whose release notifications this component receives
    pub fn seized_resources(&self) -> &[ResourceId] {
        match self {
            Component::Seize(s) => s.resources(),
            _ => &[],
        }
    }

    pub fn service(&self) -> Option<&ServiceCore> {
        match self {
            Component::Server(s) => Some(s.service()),
            Component::Seize(s) => Some(s.service()),
            Component::Pack(p) => Some(p.service()),
            Component::ConditionPack(p) => Some(p.service()),
            Component::Unpack(u) => Some(u.service()),
            Component::Assemble(a) => Some(a.service()),
            Component::Generator(_) | Component::Release(_) | Component::Sink(_) => None,
        }
    }

    pub(crate) fn service_mut(&mut self) -> Option<&mut ServiceCore> {
        match self {
            Component::Server(s) => Some(s.service_mut()),
            Component::Seize(s) => Some(s.service_mut()),
            Component::Pack(p) => Some(p.service_mut()),
            Component::ConditionPack(p) => Some(p.service_mut()),
            Component::Unpack(u) => Some(u.service_mut()),
            Component::Assemble(a) => Some(a.service_mut()),
            Component::Generator(_) | Component::Release(_) | Component::Sink(_) => None,
        }
    }

    pub fn service_state(&self) -> Option<ServiceState> {
        self.service().map(ServiceCore::state)
    }

    /// Check references and list lengths before the run starts
    pub(crate) fn validate(&self, sim: &Simulation, core: &ComponentCore) -> SimResult<()> {
        let name = core.name();
        for q in self.wait_queues() {
            sim.queue(q).map_err(|_| config_error(name, format!("unknown wait queue {}", q)))?;
        }

        let needs_next = !matches!(self, Component::Sink(_));
        match core.next() {
            None if needs_next => return Err(config_error(name, "missing next component")),
            Some(Destination::Queue(q)) => {
                sim.queue(q).map_err(|_| config_error(name, format!("unknown next queue {}", q)))?;
            }
            Some(Destination::Component(c)) => {
                sim.component_core(c)
                    .map_err(|_| config_error(name, format!("unknown next component {}", c)))?;
            }
            None => {}
        }

        let (resources, units) = match self {
            Component::Seize(s) => (s.resources(), s.units()),
            Component::Release(r) => (r.resources(), r.units()),
            _ => (&[][..], &[][..]),
        };
        if resources.len() != units.len() {
            return Err(config_error(
                name,
                format!("{} resources but {} unit counts", resources.len(), units.len()),
            ));
        }
        for (r, n) in resources.iter().zip(units) {
            let resource = sim
                .resource(*r)
                .map_err(|_| config_error(name, format!("unknown resource {}", r)))?;
            if *n > resource.capacity() {
                return Err(config_error(
                    name,
                    format!("needs {} units of {} with capacity {}", n, resource.name(), resource.capacity()),
                ));
            }
        }

        if let Component::Assemble(a) = self {
            if a.wait_queues().is_empty() {
                return Err(config_error(name, "no wait queues"));
            }
            if a.required().is_empty() {
                return Err(config_error(name, "no required counts"));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// First scheduling at run start
    pub(crate) fn start(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<()> {
        match self {
            Component::Generator(g) => g.start(sim, id),
            _ => self.restart(sim, id),
        }
    }

    /// Re-evaluate after a notification
    pub(crate) fn restart(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<()> {
        match self {
            Component::Server(s) => service::restart(s, sim, id),
            Component::Seize(s) => s.serve(sim, id).map(|_| ()),
            Component::Pack(p) => service::restart(p, sim, id),
            Component::ConditionPack(p) => service::restart(p, sim, id),
            Component::Unpack(u) => service::restart(u, sim, id),
            Component::Assemble(a) => service::restart(a, sim, id),
            Component::Generator(_) | Component::Release(_) | Component::Sink(_) => Ok(()),
        }
    }

    pub(crate) fn end_step(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<()> {
        match self {
            Component::Server(s) => service::end_step(s, sim, id),
            Component::Pack(p) => service::end_step(p, sim, id),
            Component::ConditionPack(p) => service::end_step(p, sim, id),
            Component::Unpack(u) => service::end_step(u, sim, id),
            Component::Assemble(a) => service::end_step(a, sim, id),
            _ => Ok(()),
        }
    }

    pub(crate) fn generate(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<()> {
        match self {
            Component::Generator(g) => g.generate(sim, id),
            _ => Ok(()),
        }
    }

    /// Accept an item sent directly to this component
    pub(crate) fn receive(&mut self, sim: &mut Simulation, id: ComponentId, item: ItemId) -> SimResult<()> {
        match self {
            Component::Release(r) => r.receive(sim, id, item),
            Component::Sink(s) => s.receive(sim, id, item),
            other => Err(SimError::precondition(
                sim.component_core(id)?.name(),
                "receive",
                format!("{} does not accept items directly", other.kind()),
            )),
        }
    }

    /// Sort key of a seizer that could start now
    pub(crate) fn seize_candidate(
        &mut self,
        sim: &Simulation,
        id: ComponentId,
    ) -> SimResult<Option<(i32, SimTime)>> {
        match self {
            Component::Seize(s) => s.candidate(sim, id),
            _ => Ok(None),
        }
    }

    /// Serve one waiting item if possible
    pub(crate) fn serve_seize(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<bool> {
        match self {
            Component::Seize(s) => s.serve_one(sim, id),
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_counters() {
        let mut core = ComponentCore::new("S1").with_state_assignment("busy");
        core.record_received(ItemId::new(1));
        core.record_received(ItemId::new(2));
        core.record_processed(SimTime::new(4));

        assert_eq!(core.number_added(), 2);
        assert_eq!(core.number_processed(), 1);
        assert_eq!(core.number_in_progress(), 1);
        assert_eq!(core.received(), Some(ItemId::new(2)));
        assert_eq!(core.release_time(), Some(SimTime::new(4)));
        assert_eq!(core.state_assignment(), Some("busy"));
    }

    #[test]
    fn test_inputs() {
        let sink: Component = Sink.into();
        assert_eq!(sink.input(), Input::Direct);
        assert!(sink.wait_queues().is_empty());
        assert_eq!(sink.kind(), "Sink");
        assert!(sink.service_state().is_none());
    }
}
