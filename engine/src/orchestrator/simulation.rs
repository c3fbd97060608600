//! Simulation context and event loop
//!
//! [`Simulation`] owns everything that exists during a run: the event
//! queue and clock, the process scheduler, every queue, resource,
//! component and item, the event log and the random stream. Components
//! and processes refer to one another only by index and reach shared
//! state through the `&mut Simulation` they are handed while they run.
//!
//! # Event loop
//!
//! [`step`](Simulation::step) pops the next event, advances the clock to
//! its tick and dispatches its [`Action`] to completion. Scheduling done
//! while an action runs lands back in the queue; nothing runs
//! re-entrantly. A precondition violation halts the run, whether it was
//! raised inside an event or by a direct call such as
//! [`queue_remove_first`](Simulation::queue_remove_first): the error is
//! recorded, logged, and every later `step` or model mutation fails with
//! `Halted`.
//!
//! # Notifications
//!
//! Every queue mutation schedules one de-duplicated `NotifyQueueUsers`
//! event in the `Notify` band at the current tick, so all arrivals of a
//! tick settle before consumers re-evaluate once. A resource release
//! does the same with `NotifyResourceUsers`. Suspended `WaitUntil`
//! processes are re-checked after each notification pass.

use crate::components::{Component, ComponentCore, Input, ServiceState};
use crate::core::error::{SimError, SimResult};
use crate::core::time::{SimTime, TimeBase};
use crate::events::{Action, EventHandle, EventKey, EventQueue, Priority};
use crate::models::{
    ComponentId, Destination, EntStorage, Entry, Event, EventLog, Item, ItemId, ItemRegistry, Queue, QueueId,
    Resource, ResourceId,
};
use crate::orchestrator::report::RunReport;
use crate::process::{Process, ProcessId, ProcessScheduler, ProcessState, Step};
use crate::providers::{plain_string, EvalContext, PositionObserver};
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

fn default_ticks_per_second() -> f64 {
    TimeBase::DEFAULT_TICKS_PER_SECOND
}

/// Run-wide settings, fixed when the simulation is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Clock resolution
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: f64,

    /// Seed of the master random stream
    #[serde(default)]
    pub rng_seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: default_ticks_per_second(),
            rng_seed: 0,
        }
    }
}

// ============================================================================
// Simulation
// ============================================================================

struct ComponentSlot {
    core: ComponentCore,
    /// Taken out while the component runs
    body: Option<Component>,
    input: Input,
}

/// The simulation context
///
/// # Example
///
/// ```rust
/// use flow_simulator_core_rs::components::{ComponentCore, Generator, Server, Sink};
/// use flow_simulator_core_rs::models::{Destination, Queue};
/// use flow_simulator_core_rs::orchestrator::{SimConfig, Simulation};
/// use flow_simulator_core_rs::providers::Constant;
///
/// let mut sim = Simulation::new(SimConfig { ticks_per_second: 1.0, rng_seed: 7 }).unwrap();
/// let waiting = sim.add_queue(Queue::new("Waiting"));
/// let sink = sim.add_component(ComponentCore::new("Exit"), Sink);
/// let server = sim.add_component(
///     ComponentCore::new("Desk").with_next(Destination::Component(sink)),
///     Server::new(waiting, Box::new(Constant(3.0))),
/// );
/// sim.add_component(
///     ComponentCore::new("Arrivals").with_next(Destination::Component(server)),
///     Generator::new(Box::new(Constant(5.0))).with_max_count(4),
/// );
///
/// sim.start().unwrap();
/// sim.run().unwrap();
///
/// assert_eq!(sim.component_core(sink).unwrap().number_processed(), 4);
/// assert_eq!(sim.now().ticks(), 18);
/// ```
pub struct Simulation {
    config: SimConfig,
    time_base: TimeBase,
    events: EventQueue<Action>,
    processes: ProcessScheduler,

    queues: Vec<Queue>,
    resources: Vec<Resource>,
    components: Vec<ComponentSlot>,
    items: ItemRegistry,

    event_log: EventLog,
    rng: RngManager,
    observer: Option<Box<dyn PositionObserver>>,

    started: bool,
    dispatching: bool,
    halted: Option<SimError>,
    /// Pending de-duplicated `EvaluateConditions` event
    conditions_pending: Option<EventHandle>,
}

impl Simulation {
    /// Create an empty simulation
    ///
    /// Fails with `InvalidConfig` if the tick rate is not a positive
    /// finite number.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        Self::validate_config(&config)?;
        let time_base = TimeBase::new(config.ticks_per_second);
        let rng = RngManager::new(config.rng_seed);

        Ok(Self {
            config,
            time_base,
            events: EventQueue::new(),
            processes: ProcessScheduler::new(),
            queues: Vec::new(),
            resources: Vec::new(),
            components: Vec::new(),
            items: ItemRegistry::new(),
            event_log: EventLog::new(),
            rng,
            observer: None,
            started: false,
            dispatching: false,
            halted: None,
            conditions_pending: None,
        })
    }

    fn validate_config(config: &SimConfig) -> SimResult<()> {
        if !config.ticks_per_second.is_finite() || config.ticks_per_second <= 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "ticks_per_second must be > 0, got {}",
                config.ticks_per_second
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Current virtual time
    pub fn now(&self) -> SimTime {
        self.events.now()
    }

    /// Current virtual time in seconds
    pub fn now_seconds(&self) -> f64 {
        self.time_base.time_to_seconds(self.now())
    }

    /// Number of events waiting to fire
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn events_fired(&self) -> u64 {
        self.events.events_fired()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn items(&self) -> &ItemRegistry {
        &self.items
    }

    pub fn item(&self, id: ItemId) -> SimResult<&Item> {
        self.items.get(id).ok_or_else(|| SimError::unknown("item", id))
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Error that halted the run, if any
    pub fn halt_error(&self) -> Option<&SimError> {
        self.halted.as_ref()
    }

    /// Seed for an independent random stream
    ///
    /// Streams are drawn from the master stream in call order, so a model
    /// built in the same order gets the same streams.
    pub fn derive_seed(&mut self) -> u64 {
        self.rng.derive_seed()
    }

    /// Attach the renderer that receives queue layout updates
    pub fn set_position_observer(&mut self, observer: Box<dyn PositionObserver>) {
        self.observer = Some(observer);
    }

    // ========================================================================
    // Model building
    // ========================================================================

    pub fn add_queue(&mut self, queue: Queue) -> QueueId {
        self.queues.push(queue);
        QueueId(self.queues.len() - 1)
    }

    pub fn add_resource(&mut self, resource: Resource) -> ResourceId {
        self.resources.push(resource);
        ResourceId(self.resources.len() - 1)
    }

    pub fn add_component(&mut self, core: ComponentCore, body: impl Into<Component>) -> ComponentId {
        let body = body.into();
        let input = body.input();
        self.components.push(ComponentSlot {
            core,
            body: Some(body),
            input,
        });
        ComponentId(self.components.len() - 1)
    }

    /// Link a component to the destination of its finished items
    pub fn set_next(&mut self, id: ComponentId, next: Destination) -> SimResult<()> {
        self.component_core_mut(id)?.set_next(next);
        Ok(())
    }

    pub fn queue(&self, id: QueueId) -> SimResult<&Queue> {
        self.queues.get(id.0).ok_or_else(|| SimError::unknown("queue", id))
    }

    fn queue_mut(&mut self, id: QueueId) -> SimResult<&mut Queue> {
        self.queues.get_mut(id.0).ok_or_else(|| SimError::unknown("queue", id))
    }

    pub fn queues(&self) -> &[Queue] {
        &self.queues
    }

    pub fn resource(&self, id: ResourceId) -> SimResult<&Resource> {
        self.resources.get(id.0).ok_or_else(|| SimError::unknown("resource", id))
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn component_core(&self, id: ComponentId) -> SimResult<&ComponentCore> {
        self.components
            .get(id.0)
            .map(|slot| &slot.core)
            .ok_or_else(|| SimError::unknown("component", id))
    }

    pub fn component_core_mut(&mut self, id: ComponentId) -> SimResult<&mut ComponentCore> {
        self.components
            .get_mut(id.0)
            .map(|slot| &mut slot.core)
            .ok_or_else(|| SimError::unknown("component", id))
    }

    /// Component body; fails with `Reentrant` while the component runs
    pub fn component(&self, id: ComponentId) -> SimResult<&Component> {
        let slot = self
            .components
            .get(id.0)
            .ok_or_else(|| SimError::unknown("component", id))?;
        slot.body
            .as_ref()
            .ok_or_else(|| SimError::Reentrant(slot.core.name().to_string()))
    }

    /// Name of a component, or its index if it does not exist
    pub fn component_name(&self, id: ComponentId) -> String {
        self.component_core(id)
            .map_or_else(|_| id.to_string(), |core| core.name().to_string())
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> {
        (0..self.components.len()).map(ComponentId)
    }

    pub fn find_queue(&self, name: &str) -> Option<QueueId> {
        self.queues.iter().position(|q| q.name() == name).map(QueueId)
    }

    pub fn find_resource(&self, name: &str) -> Option<ResourceId> {
        self.resources.iter().position(|r| r.name() == name).map(ResourceId)
    }

    pub fn find_component(&self, name: &str) -> Option<ComponentId> {
        self.components
            .iter()
            .position(|slot| slot.core.name() == name)
            .map(ComponentId)
    }

    /// State of a service component
    pub fn service_state(&self, id: ComponentId) -> Option<ServiceState> {
        self.component(id).ok().and_then(Component::service_state)
    }

    /// Open or close the gate of a service component
    ///
    /// Opening the gate schedules a re-evaluation at the current tick.
    pub fn set_gate(&mut self, id: ComponentId, open: bool) -> SimResult<()> {
        let slot = self
            .components
            .get_mut(id.0)
            .ok_or_else(|| SimError::unknown("component", id))?;
        let ComponentSlot { core, body, .. } = slot;
        let body = body
            .as_mut()
            .ok_or_else(|| SimError::Reentrant(core.name().to_string()))?;
        let service = body
            .service_mut()
            .ok_or_else(|| SimError::precondition(core.name(), "set_gate", "component has no gate"))?;
        service.set_open(open);

        if open {
            self.schedule_ticks(0, Priority::Normal, true, Action::Restart(id))?;
        }
        Ok(())
    }

    // ========================================================================
    // Run control
    // ========================================================================

    /// Validate the model and schedule the first events
    ///
    /// Registers every component as a user of its wait queues and seized
    /// resources, schedules the first generator arrivals and lets every
    /// service check whether it can start.
    pub fn start(&mut self) -> SimResult<()> {
        if self.started {
            return Err(SimError::InvalidConfig("simulation already started".to_string()));
        }
        self.validate_model()?;

        for i in 0..self.components.len() {
            let id = ComponentId(i);
            let (wait_queues, resources) = match &self.components[i].body {
                Some(body) => (body.wait_queues(), body.seized_resources().to_vec()),
                None => continue,
            };
            for q in wait_queues {
                self.queue_mut(q)?.register_user(id);
            }
            for r in resources {
                if let Some(resource) = self.resources.get_mut(r.0) {
                    resource.register_user(id);
                }
            }
        }

        log::info!(
            "Starting simulation: {} queues, {} resources, {} components, {} ticks/s, seed {}",
            self.queues.len(),
            self.resources.len(),
            self.components.len(),
            self.config.ticks_per_second,
            self.config.rng_seed
        );
        self.started = true;

        for i in 0..self.components.len() {
            let result = self.with_component(ComponentId(i), |body, sim, id| body.start(sim, id));
            result.map_err(|e| self.halt(e))?;
        }
        Ok(())
    }

    pub(crate) fn validate_model(&self) -> SimResult<()> {
        for slot in &self.components {
            if let Some(body) = &slot.body {
                body.validate(self, &slot.core)?;
            }
        }
        for queue in &self.queues {
            if let Some(renege) = &queue.renege {
                let known = match renege.destination {
                    Destination::Queue(q) => self.queue(q).is_ok(),
                    Destination::Component(c) => self.component_core(c).is_ok(),
                };
                if !known {
                    return Err(SimError::InvalidConfig(format!(
                        "{}: unknown renege destination",
                        queue.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fire the next event
    ///
    /// Returns `Ok(false)` once nothing is pending. Starts the simulation
    /// first if [`start`](Self::start) was not called.
    pub fn step(&mut self) -> SimResult<bool> {
        if self.halted.is_some() {
            return Err(SimError::Halted);
        }
        if self.dispatching {
            return Err(SimError::Reentrant("step".to_string()));
        }
        if !self.started {
            self.start()?;
        }

        let Some((key, action)) = self.events.pop() else {
            return Ok(false);
        };
        self.dispatching = true;
        let result = self.dispatch(key, action);
        self.dispatching = false;

        match result {
            Ok(()) => Ok(true),
            Err(e) => Err(self.halt(e)),
        }
    }

    /// Fire events until none are pending
    pub fn run(&mut self) -> SimResult<()> {
        while self.step()? {}
        log::info!("Simulation finished at {} after {} events", self.now(), self.events_fired());
        Ok(())
    }

    /// Fire every event due at or before `end`, then move the clock to `end`
    pub fn run_until(&mut self, end: SimTime) -> SimResult<()> {
        if self.halted.is_some() {
            return Err(SimError::Halted);
        }
        if end < self.now() {
            return Err(SimError::NonCausal {
                requested: end,
                current: self.now(),
            });
        }
        if !self.started {
            self.start()?;
        }
        while self.events.peek_time().is_some_and(|t| t <= end) {
            self.step()?;
        }
        self.events.advance_to(end)?;
        log::info!("Simulation paused at {} after {} events", self.now(), self.events_fired());
        Ok(())
    }

    /// [`run_until`](Self::run_until) with the end given in seconds
    pub fn run_until_seconds(&mut self, secs: f64) -> SimResult<()> {
        let ticks = self
            .time_base
            .seconds_to_ticks(secs)
            .ok_or(SimError::InvalidDuration(secs))?;
        self.run_until(SimTime::new(ticks))
    }

    /// Summary of the run so far
    pub fn report(&self) -> SimResult<RunReport> {
        RunReport::from_simulation(self)
    }

    /// Reset every counter and time-weighted statistic; contents are kept
    pub fn clear_statistics(&mut self) {
        let now = self.now();
        for queue in &mut self.queues {
            queue.clear_statistics(now);
        }
        for resource in &mut self.resources {
            resource.clear_statistics(now);
        }
        for slot in &mut self.components {
            slot.core.clear_statistics();
        }
    }

    fn halt(&mut self, error: SimError) -> SimError {
        if error.is_fatal() && self.halted.is_none() {
            log::error!("{} simulation halted: {}", self.now(), error);
            self.halted = Some(error.clone());
        }
        error
    }

    /// Run a model mutation: refused once halted, and a fatal failure
    /// halts the run wherever it was raised
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> SimResult<T>) -> SimResult<T> {
        if self.halted.is_some() {
            return Err(SimError::Halted);
        }
        let result = f(self);
        result.map_err(|e| self.halt(e))
    }

    fn dispatch(&mut self, key: EventKey, action: Action) -> SimResult<()> {
        log::debug!("{} [{}] {}", key.tick, key.priority, action);
        match action {
            Action::NotifyQueueUsers(q) => self.notify_queue_users(q),
            Action::NotifyResourceUsers(r) => self.serve_seizers(r),
            Action::EvaluateConditions => {
                self.conditions_pending = None;
                self.evaluate_conditions()
            }
            Action::Renege { queue, item } => self.renege(queue, item),
            Action::EndStep(c) => self.with_component(c, |body, sim, id| body.end_step(sim, id)),
            Action::Restart(c) => self.with_component(c, |body, sim, id| body.restart(sim, id)),
            Action::Generate(c) => self.with_component(c, |body, sim, id| body.generate(sim, id)),
            Action::Resume(p) => self.resume_process(p),
        }
    }

    /// Run `f` with the component's body taken out of its slot
    pub(crate) fn with_component<T>(
        &mut self,
        id: ComponentId,
        f: impl FnOnce(&mut Component, &mut Simulation, ComponentId) -> SimResult<T>,
    ) -> SimResult<T> {
        let slot = self
            .components
            .get_mut(id.0)
            .ok_or_else(|| SimError::unknown("component", id))?;
        let mut body = slot
            .body
            .take()
            .ok_or_else(|| SimError::Reentrant(slot.core.name().to_string()))?;
        let result = f(&mut body, self, id);
        self.components[id.0].body = Some(body);
        result
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Schedule `action` `ticks` after now
    pub fn schedule_ticks(
        &mut self,
        ticks: u64,
        priority: Priority,
        fifo: bool,
        action: Action,
    ) -> SimResult<EventHandle> {
        let at = self
            .now()
            .plus(ticks)
            .ok_or(SimError::InvalidDuration(ticks as f64))?;
        self.events.schedule_at(at, priority, fifo, action)
    }

    /// Schedule `action` `secs` seconds after now, rounded to the nearest tick
    pub fn schedule_seconds(
        &mut self,
        secs: f64,
        priority: Priority,
        fifo: bool,
        action: Action,
    ) -> SimResult<EventHandle> {
        let ticks = self
            .time_base
            .seconds_to_ticks(secs)
            .ok_or(SimError::InvalidDuration(secs))?;
        self.schedule_ticks(ticks, priority, fifo, action)
    }

    /// Cancel a pending event; `false` if it already fired or was cancelled
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.events.cancel(handle)
    }

    pub fn is_scheduled(&self, handle: &EventHandle) -> bool {
        self.events.is_scheduled(handle)
    }

    fn notify_queue(&mut self, q: QueueId) -> SimResult<()> {
        if let Some(pending) = self.queue(q)?.notify {
            if self.events.is_scheduled(&pending) {
                return Ok(());
            }
        }
        let handle = self.schedule_ticks(0, Priority::Notify, false, Action::NotifyQueueUsers(q))?;
        self.queue_mut(q)?.notify = Some(handle);
        Ok(())
    }

    fn notify_resource(&mut self, r: ResourceId) -> SimResult<()> {
        if let Some(pending) = self.resource(r)?.notify {
            if self.events.is_scheduled(&pending) {
                return Ok(());
            }
        }
        let handle = self.schedule_ticks(0, Priority::Notify, false, Action::NotifyResourceUsers(r))?;
        if let Some(resource) = self.resources.get_mut(r.0) {
            resource.notify = Some(handle);
        }
        Ok(())
    }

    fn notify_queue_users(&mut self, q: QueueId) -> SimResult<()> {
        self.publish_positions(q)?;
        let users = self.queue(q)?.users.clone();
        for c in users {
            self.with_component(c, |body, sim, id| body.restart(sim, id))?;
        }
        self.evaluate_conditions()
    }

    /// Serve waiting seizers one item at a time, most urgent first
    fn serve_seizers(&mut self, r: ResourceId) -> SimResult<()> {
        let users = self.resource(r)?.users.clone();
        loop {
            let mut best: Option<((i32, SimTime, usize), ComponentId)> = None;
            for (order, c) in users.iter().enumerate() {
                let candidate = self.with_component(*c, |body, sim, id| body.seize_candidate(sim, id))?;
                if let Some((priority, arrived)) = candidate {
                    let key = (priority, arrived, order);
                    if best.map_or(true, |(k, _)| key < k) {
                        best = Some((key, *c));
                    }
                }
            }
            let Some((_, c)) = best else {
                break;
            };
            if !self.with_component(c, |body, sim, id| body.serve_seize(sim, id))? {
                break;
            }
        }
        self.evaluate_conditions()
    }

    fn publish_positions(&mut self, q: QueueId) -> SimResult<()> {
        let Some(observer) = self.observer.as_mut() else {
            return Ok(());
        };
        let queue = self.queues.get(q.0).ok_or_else(|| SimError::unknown("queue", q))?;
        for (i, item) in queue.items().into_iter().enumerate() {
            observer.position_update(item, queue.slot_position(i));
        }
        Ok(())
    }

    // ========================================================================
    // Queues
    // ========================================================================

    /// Add `item` to a queue, keyed by the queue's priority and match
    /// providers evaluated with the item as current
    pub fn queue_add(&mut self, q: QueueId, item: ItemId) -> SimResult<()> {
        self.guarded(|sim| sim.queue_add_impl(q, item))
    }

    fn queue_add_impl(&mut self, q: QueueId, item: ItemId) -> SimResult<()> {
        let (priority, match_value) = {
            let queue = self.queue(q)?;
            let ctx = EvalContext::new(self, Some(item));
            let priority = queue.priority.as_ref().map_or(0.0, |p| p.next_sample(&ctx));
            let match_value = queue
                .match_provider
                .as_ref()
                .map(|p| plain_string(p.as_ref(), &ctx));
            (priority, match_value)
        };
        if !priority.is_finite() {
            return Err(SimError::precondition(
                self.queue(q)?.name(),
                "add",
                format!("priority {} is not a number", priority),
            ));
        }
        self.queue_add_with(q, item, priority.round() as i32, match_value)
    }

    /// Add `item` to a queue with an explicit priority and match value
    ///
    /// Fails if the item is already in the queue or the priority is
    /// negative. Schedules the renege check if the queue reneges and a
    /// contents-changed notification.
    pub fn queue_add_with(
        &mut self,
        q: QueueId,
        item: ItemId,
        priority: i32,
        match_value: Option<String>,
    ) -> SimResult<()> {
        self.guarded(|sim| sim.queue_add_with_impl(q, item, priority, match_value))
    }

    fn queue_add_with_impl(
        &mut self,
        q: QueueId,
        item: ItemId,
        priority: i32,
        match_value: Option<String>,
    ) -> SimResult<()> {
        if let Some(parent) = self.item(item)?.parent() {
            return Err(SimError::precondition(
                self.queue(q)?.name(),
                "add",
                format!("{} is still inside {}", item, parent),
            ));
        }
        let now = self.now();
        let queue = self.queue_mut(q)?;
        let fifo = queue.is_fifo();
        queue
            .insert(item, priority, match_value.clone(), fifo, now)
            .map_err(|e| SimError::collection(queue.name(), "add", e))?;
        let name = queue.name().to_string();
        log::trace!("{} {} add {} (priority {}, match {:?})", now, name, item, priority, match_value);
        self.log_event(Event::QueueAdd {
            tick: now.ticks(),
            queue: name.clone(),
            item,
            priority,
            match_value,
        });

        let renege_secs = self.queue(q)?.renege.as_ref().map(|renege| {
            renege
                .time
                .next_sample(&EvalContext::new(self, Some(item)))
        });
        if let Some(secs) = renege_secs {
            let ticks = self
                .time_base
                .seconds_to_ticks(secs)
                .ok_or(SimError::InvalidDuration(secs))?;
            let handle = self.schedule_ticks(ticks, Priority::Renege, true, Action::Renege { queue: q, item })?;
            self.queue_mut(q)?
                .set_renege(item, handle)
                .map_err(|e| SimError::collection(name.as_str(), "add", e))?;
        }

        self.notify_queue(q)
    }

    /// Remove the first item; an empty queue is a precondition violation
    pub fn queue_remove_first(&mut self, q: QueueId) -> SimResult<ItemId> {
        self.guarded(|sim| sim.queue_remove_first_impl(q))
    }

    fn queue_remove_first_impl(&mut self, q: QueueId) -> SimResult<ItemId> {
        let now = self.now();
        let queue = self.queue_mut(q)?;
        let entry = queue
            .pop_first(now)
            .map_err(|e| SimError::collection(queue.name(), "remove_first", e))?;
        self.after_queue_remove(q, entry)
    }

    /// Remove the first item with match `m` (`None` = any item)
    ///
    /// An absent match value yields `Ok(None)`; removing any item from an
    /// empty queue is a precondition violation.
    pub fn queue_remove_first_for_match(&mut self, q: QueueId, m: Option<&str>) -> SimResult<Option<ItemId>> {
        self.guarded(|sim| sim.queue_remove_first_for_match_impl(q, m))
    }

    fn queue_remove_first_for_match_impl(&mut self, q: QueueId, m: Option<&str>) -> SimResult<Option<ItemId>> {
        let now = self.now();
        let queue = self.queue_mut(q)?;
        let entry = queue
            .pop_first_for_match(m, now)
            .map_err(|e| SimError::collection(queue.name(), "remove_first_for_match", e))?;
        match entry {
            Some(entry) => self.after_queue_remove(q, entry).map(Some),
            None => Ok(None),
        }
    }

    /// Remove a specific item
    pub fn queue_remove(&mut self, q: QueueId, item: ItemId) -> SimResult<()> {
        self.guarded(|sim| sim.queue_remove_impl(q, item))
    }

    fn queue_remove_impl(&mut self, q: QueueId, item: ItemId) -> SimResult<()> {
        let now = self.now();
        let queue = self.queue_mut(q)?;
        let entry = queue
            .remove(item, now)
            .map_err(|e| SimError::collection(queue.name(), "remove", e))?;
        self.after_queue_remove(q, entry).map(|_| ())
    }

    fn after_queue_remove(&mut self, q: QueueId, entry: Entry) -> SimResult<ItemId> {
        if let Some(handle) = entry.renege {
            self.events.cancel(handle);
        }
        let name = self.queue(q)?.name().to_string();
        log::trace!("{} {} remove {}", self.now(), name, entry.item);
        self.log_event(Event::QueueRemove {
            tick: self.now().ticks(),
            queue: name,
            item: entry.item,
        });
        self.notify_queue(q)?;
        Ok(entry.item)
    }

    fn renege(&mut self, q: QueueId, item: ItemId) -> SimResult<()> {
        let queue = self.queue(q)?;
        if !queue.contains(item) {
            return Ok(());
        }
        let Some(renege) = &queue.renege else {
            return Ok(());
        };
        let leave = renege.condition.as_ref().map_or(true, |cond| {
            cond.next_sample(&EvalContext::new(self, Some(item))) != 0.0
        });
        let destination = renege.destination;
        if !leave {
            return Ok(());
        }

        let now = self.now();
        let queue = self.queue_mut(q)?;
        let entry = queue
            .remove(item, now)
            .map_err(|e| SimError::collection(queue.name(), "renege", e))?;
        queue.count_renege();
        let name = queue.name().to_string();
        log::debug!("{} {} renege {}", now, name, item);
        self.log_event(Event::Renege {
            tick: now.ticks(),
            queue: name,
            item,
        });
        self.after_queue_remove(q, entry)?;
        self.send(item, destination)
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Take `units` of a resource; more than available is a precondition
    /// violation
    pub fn resource_seize(&mut self, r: ResourceId, units: u32) -> SimResult<()> {
        self.guarded(|sim| sim.resource_seize_impl(r, units))
    }

    fn resource_seize_impl(&mut self, r: ResourceId, units: u32) -> SimResult<()> {
        let now = self.now();
        let resource = self
            .resources
            .get_mut(r.0)
            .ok_or_else(|| SimError::unknown("resource", r))?;
        resource
            .seize(units, now)
            .map_err(|e| SimError::resource(resource.name(), e))?;
        let (name, in_use) = (resource.name().to_string(), resource.units_in_use());
        log::trace!("{} {} seize {} ({} in use)", now, name, units, in_use);
        self.log_event(Event::Seize {
            tick: now.ticks(),
            resource: name,
            units,
            in_use,
        });
        Ok(())
    }

    /// Return `units` of a resource and notify its seizers; more than in
    /// use is a precondition violation
    pub fn resource_release(&mut self, r: ResourceId, units: u32) -> SimResult<()> {
        self.guarded(|sim| sim.resource_release_impl(r, units))
    }

    fn resource_release_impl(&mut self, r: ResourceId, units: u32) -> SimResult<()> {
        let now = self.now();
        let resource = self
            .resources
            .get_mut(r.0)
            .ok_or_else(|| SimError::unknown("resource", r))?;
        resource
            .release(units, now)
            .map_err(|e| SimError::resource(resource.name(), e))?;
        let (name, in_use) = (resource.name().to_string(), resource.units_in_use());
        log::trace!("{} {} release {} ({} in use)", now, name, units, in_use);
        self.log_event(Event::Release {
            tick: now.ticks(),
            resource: name,
            units,
            in_use,
        });
        self.notify_resource(r)
    }

    // ========================================================================
    // Items and containers
    // ========================================================================

    /// Create an item outside any component
    pub fn create_item(&mut self, name: impl Into<String>) -> ItemId {
        self.create_item_by(name, "")
    }

    pub(crate) fn create_item_by(&mut self, name: impl Into<String>, creator: &str) -> ItemId {
        let name = name.into();
        let now = self.now();
        let id = self.items.create(name.clone(), now);
        self.log_event(Event::ItemCreated {
            tick: now.ticks(),
            item: id,
            name,
            created_by: creator.to_string(),
        });
        id
    }

    /// Remove an item and, recursively, everything it contains
    ///
    /// Destroying an item that is still waiting in a queue or packed in a
    /// container is a precondition violation.
    pub fn destroy_item(&mut self, item: ItemId) -> SimResult<()> {
        self.guarded(|sim| sim.destroy_item_impl(item))
    }

    fn destroy_item_impl(&mut self, item: ItemId) -> SimResult<()> {
        if let Some(queue) = self.queues.iter().find(|q| q.contains(item)) {
            return Err(SimError::precondition(
                queue.name(),
                "destroy_item",
                format!("{} is still queued", item),
            ));
        }
        if let Some(parent) = self.item(item)?.parent() {
            return Err(SimError::precondition(
                self.item(item)?.name(),
                "destroy_item",
                format!("{} is still inside {}", item, parent),
            ));
        }
        let mut removed = self.items.remove(item).ok_or_else(|| SimError::unknown("item", item))?;
        let contents = removed.storage_mut().map(EntStorage::drain).unwrap_or_default();
        self.log_event(Event::ItemDestroyed {
            tick: self.now().ticks(),
            item,
        });
        for child in contents {
            if let Some(it) = self.items.get_mut(child) {
                it.set_parent(None);
            }
            self.destroy_item_impl(child)?;
        }
        Ok(())
    }

    /// Set the state of an item and of everything it contains
    pub fn set_item_state(&mut self, item: ItemId, state: Option<String>) -> SimResult<()> {
        self.guarded(|sim| sim.set_item_state_impl(item, state))
    }

    fn set_item_state_impl(&mut self, item: ItemId, state: Option<String>) -> SimResult<()> {
        let it = self.items.get_mut(item).ok_or_else(|| SimError::unknown("item", item))?;
        it.set_state(state.clone());
        let contents = it.storage().map(EntStorage::items).unwrap_or_default();
        for child in contents {
            self.set_item_state_impl(child, state.clone())?;
        }
        Ok(())
    }

    /// Give an item an (empty) entity storage
    pub fn make_container(&mut self, item: ItemId, fifo: bool) -> SimResult<()> {
        self.guarded(|sim| sim.make_container_impl(item, fifo))
    }

    fn make_container_impl(&mut self, item: ItemId, fifo: bool) -> SimResult<()> {
        self.items
            .get_mut(item)
            .ok_or_else(|| SimError::unknown("item", item))?
            .make_container(fifo);
        Ok(())
    }

    fn storage_mut(&mut self, container: ItemId, operation: &'static str) -> SimResult<(String, &mut EntStorage)> {
        let it = self
            .items
            .get_mut(container)
            .ok_or_else(|| SimError::unknown("item", container))?;
        let name = it.name().to_string();
        match it.storage_mut() {
            Some(storage) => Ok((name, storage)),
            None => Err(SimError::precondition(name, operation, "item is not a container")),
        }
    }

    /// Insert `item` into a container
    ///
    /// The item must not be waiting in a queue, already packed elsewhere,
    /// or the container itself or any container around it.
    pub fn container_add(
        &mut self,
        container: ItemId,
        item: ItemId,
        priority: i32,
        match_value: Option<String>,
    ) -> SimResult<()> {
        self.guarded(|sim| sim.container_add_impl(container, item, priority, match_value))
    }

    fn container_add_impl(
        &mut self,
        container: ItemId,
        item: ItemId,
        priority: i32,
        match_value: Option<String>,
    ) -> SimResult<()> {
        if !self.items.contains(item) {
            return Err(SimError::unknown("item", item));
        }
        let container_name = self.item(container)?.name().to_string();
        if let Some(queue) = self.queues.iter().find(|q| q.contains(item)) {
            return Err(SimError::precondition(
                container_name,
                "container_add",
                format!("{} is still queued in {}", item, queue.name()),
            ));
        }
        if let Some(parent) = self.item(item)?.parent() {
            return Err(SimError::precondition(
                container_name,
                "container_add",
                format!("{} is already inside {}", item, parent),
            ));
        }
        // The item may not be the container or any container around it
        let mut outer = Some(container);
        while let Some(c) = outer {
            if c == item {
                return Err(SimError::precondition(
                    container_name,
                    "container_add",
                    format!("{} would end up inside itself", item),
                ));
            }
            outer = self.item(c)?.parent();
        }

        let now = self.now();
        let (name, storage) = self.storage_mut(container, "container_add")?;
        storage
            .add(item, priority, match_value, now)
            .map_err(|e| SimError::collection(name, "container_add", e))?;
        if let Some(it) = self.items.get_mut(item) {
            it.set_parent(Some(container));
        }
        self.log_event(Event::Packed {
            tick: now.ticks(),
            container,
            item,
        });
        Ok(())
    }

    /// Take the first item with match `m` (`None` = any item) out of a
    /// container
    pub fn container_remove(&mut self, container: ItemId, m: Option<&str>) -> SimResult<Option<ItemId>> {
        self.guarded(|sim| sim.container_remove_impl(container, m))
    }

    fn container_remove_impl(&mut self, container: ItemId, m: Option<&str>) -> SimResult<Option<ItemId>> {
        let (name, storage) = self.storage_mut(container, "container_remove")?;
        let removed = storage
            .remove(m)
            .map_err(|e| SimError::collection(name, "container_remove", e))?;
        if let Some(item) = removed {
            if let Some(it) = self.items.get_mut(item) {
                it.set_parent(None);
            }
            self.log_event(Event::Unpacked {
                tick: self.now().ticks(),
                container,
                item,
            });
        }
        Ok(removed)
    }

    /// Items with match `m` (`None` = all) inside a container
    pub fn container_count(&self, container: ItemId, m: Option<&str>) -> SimResult<usize> {
        let it = self.item(container)?;
        it.storage()
            .map(|s| s.count(m))
            .ok_or_else(|| SimError::precondition(it.name(), "container_count", "item is not a container"))
    }

    pub fn container_is_empty(&self, container: ItemId, m: Option<&str>) -> SimResult<bool> {
        Ok(self.container_count(container, m)? == 0)
    }

    // ========================================================================
    // Routing
    // ========================================================================

    pub(crate) fn record_received(&mut self, id: ComponentId, item: ItemId) -> SimResult<()> {
        let core = self.component_core_mut(id)?;
        core.record_received(item);
        let state = core.state_assignment().map(str::to_string);
        if state.is_some() {
            self.set_item_state(item, state)?;
        }
        Ok(())
    }

    /// Count `item` as processed by `id` and send it to `id`'s next destination
    pub(crate) fn send_to_next(&mut self, id: ComponentId, item: ItemId) -> SimResult<()> {
        let now = self.now();
        let core = self.component_core_mut(id)?;
        core.record_processed(now);
        match core.next() {
            Some(next) => self.send(item, next),
            None => Err(SimError::precondition(core.name(), "send", "no next component")),
        }
    }

    /// Deliver `item` to a queue or a component
    ///
    /// Items sent to a service component join its wait queue.
    pub fn send(&mut self, item: ItemId, destination: Destination) -> SimResult<()> {
        self.guarded(|sim| sim.send_impl(item, destination))
    }

    fn send_impl(&mut self, item: ItemId, destination: Destination) -> SimResult<()> {
        match destination {
            Destination::Queue(q) => self.queue_add(q, item),
            Destination::Component(c) => self.receive(c, item),
        }
    }

    fn receive(&mut self, c: ComponentId, item: ItemId) -> SimResult<()> {
        let input = self
            .components
            .get(c.0)
            .map(|slot| slot.input)
            .ok_or_else(|| SimError::unknown("component", c))?;
        match input {
            Input::WaitQueue(q) => {
                self.record_received(c, item)?;
                self.queue_add(q, item)
            }
            Input::Direct => {
                self.record_received(c, item)?;
                self.with_component(c, |body, sim, id| body.receive(sim, id, item))
            }
            Input::Rejected => Err(SimError::precondition(
                self.component_name(c),
                "receive",
                format!("{} cannot be sent to directly", item),
            )),
        }
    }

    // ========================================================================
    // Processes
    // ========================================================================

    /// Start a process; its first resume runs at the current tick
    pub fn start_process(&mut self, name: impl Into<String>, body: Box<dyn Process>) -> SimResult<ProcessId> {
        let id = self.processes.spawn(name, body);
        let handle = self.schedule_ticks(0, Priority::Normal, true, Action::Resume(id))?;
        self.processes.suspend_on_event(id, None, handle);
        Ok(id)
    }

    /// Kill a suspended process and cancel its wake-up
    ///
    /// Returns `false` (and does nothing) if the process is running,
    /// finished or already killed.
    pub fn kill_process(&mut self, id: ProcessId) -> bool {
        let (killed, handle) = self.processes.kill(id);
        if let Some(handle) = handle {
            self.events.cancel(handle);
        }
        if killed {
            log::debug!("{} killed {}", self.now(), id);
        }
        killed
    }

    pub fn process_state(&self, id: ProcessId) -> Option<ProcessState> {
        self.processes.state(id)
    }

    pub fn processes(&self) -> &ProcessScheduler {
        &self.processes
    }

    /// Ask for suspended `WaitUntil` conditions to be re-checked at the
    /// current tick
    pub fn trigger_conditions(&mut self) -> SimResult<()> {
        if let Some(pending) = self.conditions_pending {
            if self.events.is_scheduled(&pending) {
                return Ok(());
            }
        }
        let handle = self.schedule_ticks(0, Priority::Notify, true, Action::EvaluateConditions)?;
        self.conditions_pending = Some(handle);
        Ok(())
    }

    fn evaluate_conditions(&mut self) -> SimResult<()> {
        if !self.processes.has_waiters() {
            return Ok(());
        }
        for id in self.processes.ready(self) {
            let handle = self.schedule_ticks(0, Priority::Conditional, true, Action::Resume(id))?;
            self.processes.wake(id, handle);
        }
        Ok(())
    }

    fn resume_process(&mut self, id: ProcessId) -> SimResult<()> {
        let Some((body, condition)) = self.processes.begin(id) else {
            return Ok(());
        };
        if let Some(condition) = condition {
            if !condition(&*self) {
                log::trace!("{} {} condition no longer holds", self.now(), id);
                self.processes.suspend_on_condition(id, body, condition);
                return Ok(());
            }
        }
        let result = self.drive_process(id, body);
        if result.is_err() {
            self.processes.finish(id);
        }
        result
    }

    fn drive_process(&mut self, id: ProcessId, mut body: Box<dyn Process>) -> SimResult<()> {
        loop {
            match body.resume(self)? {
                Step::Done => {
                    self.processes.finish(id);
                    return Ok(());
                }
                Step::WaitTicks(ticks) => {
                    let handle = self.schedule_ticks(ticks, Priority::Normal, true, Action::Resume(id))?;
                    self.processes.suspend_on_event(id, Some(body), handle);
                    return Ok(());
                }
                Step::WaitSeconds(secs) => {
                    let handle = self.schedule_seconds(secs, Priority::Normal, true, Action::Resume(id))?;
                    self.processes.suspend_on_event(id, Some(body), handle);
                    return Ok(());
                }
                Step::WaitUntil(condition) => {
                    if condition(&*self) {
                        continue;
                    }
                    self.processes.suspend_on_condition(id, body, condition);
                    return Ok(());
                }
            }
        }
    }

    // ========================================================================
    // Event Logging
    // ========================================================================

    pub(crate) fn log_event(&mut self, event: Event) {
        self.event_log.log(event);
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.now())
            .field("pending_events", &self.pending_events())
            .field("queues", &self.queues.len())
            .field("resources", &self.resources.len())
            .field("components", &self.components.len())
            .field("items", &self.items.len())
            .field("halted", &self.halted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Sink;

    #[test]
    fn test_rejects_non_positive_tick_rate() {
        let config = SimConfig {
            ticks_per_second: 0.0,
            rng_seed: 1,
        };
        assert!(matches!(Simulation::new(config), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_run_ends_immediately() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        sim.run().unwrap();
        assert_eq!(sim.now(), SimTime::ZERO);
        assert_eq!(sim.events_fired(), 0);
    }

    #[test]
    fn test_run_until_advances_clock() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        sim.run_until(SimTime::new(50)).unwrap();
        assert_eq!(sim.now(), SimTime::new(50));
        assert!(matches!(
            sim.run_until(SimTime::new(10)),
            Err(SimError::NonCausal { .. })
        ));
    }

    #[test]
    fn test_notifications_are_deduplicated() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let q = sim.add_queue(Queue::new("Q"));
        sim.start().unwrap();
        for i in 0..3 {
            let item = sim.create_item(format!("i{}", i));
            sim.queue_add(q, item).unwrap();
        }
        assert_eq!(sim.pending_events(), 1);
    }

    #[test]
    fn test_destroying_queued_item_is_fatal() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let q = sim.add_queue(Queue::new("Q"));
        let item = sim.create_item("a");
        sim.queue_add(q, item).unwrap();
        let err = sim.destroy_item(item).unwrap_err();
        assert!(matches!(err, SimError::Precondition { .. }));
        assert!(sim.items().contains(item));
    }

    #[test]
    fn test_destroying_container_destroys_contents() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let crate_item = sim.create_item("crate");
        let part = sim.create_item("part");
        sim.make_container(crate_item, true).unwrap();
        sim.container_add(crate_item, part, 0, None).unwrap();
        sim.set_item_state(crate_item, Some("shipped".into())).unwrap();
        assert_eq!(sim.item(part).unwrap().state(), Some("shipped"));

        sim.destroy_item(crate_item).unwrap();
        assert!(sim.items().is_empty());
    }

    fn containers(sim: &mut Simulation, names: &[&str]) -> Vec<ItemId> {
        names
            .iter()
            .map(|name| {
                let id = sim.create_item(*name);
                sim.make_container(id, true).unwrap();
                id
            })
            .collect()
    }

    #[test]
    fn test_container_cycles_are_rejected() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let ids = containers(&mut sim, &["a", "b"]);
        let (a, b) = (ids[0], ids[1]);
        sim.container_add(a, b, 0, None).unwrap();
        assert_eq!(sim.item(b).unwrap().parent(), Some(a));

        let err = sim.container_add(b, a, 0, None).unwrap_err();
        assert!(matches!(err, SimError::Precondition { .. }));
        assert_eq!(sim.container_count(b, None).unwrap(), 0);
        assert_eq!(sim.item(a).unwrap().parent(), None);

        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let ids = containers(&mut sim, &["outer", "middle", "inner"]);
        sim.container_add(ids[0], ids[1], 0, None).unwrap();
        sim.container_add(ids[1], ids[2], 0, None).unwrap();
        assert!(sim.container_add(ids[2], ids[0], 0, None).is_err());
    }

    #[test]
    fn test_queued_item_cannot_be_packed() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let q = sim.add_queue(Queue::new("Q"));
        let ids = containers(&mut sim, &["box"]);
        let part = sim.create_item("part");
        sim.queue_add(q, part).unwrap();

        let err = sim.container_add(ids[0], part, 0, None).unwrap_err();
        assert!(matches!(err, SimError::Precondition { .. }));
        assert_eq!(sim.container_count(ids[0], None).unwrap(), 0);
        assert!(sim.queue(q).unwrap().contains(part));
    }

    #[test]
    fn test_packed_item_stays_in_one_place() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let ids = containers(&mut sim, &["left", "right"]);
        let part = sim.create_item("part");
        sim.container_add(ids[0], part, 0, None).unwrap();
        assert!(sim.container_add(ids[1], part, 0, None).is_err());
        assert_eq!(sim.container_count(ids[1], None).unwrap(), 0);

        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let q = sim.add_queue(Queue::new("Q"));
        let ids = containers(&mut sim, &["box"]);
        let part = sim.create_item("part");
        sim.container_add(ids[0], part, 0, None).unwrap();
        assert!(sim.queue_add(q, part).is_err());
        assert!(sim.queue(q).unwrap().is_empty());

        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let ids = containers(&mut sim, &["box"]);
        let part = sim.create_item("part");
        sim.container_add(ids[0], part, 0, None).unwrap();
        assert!(sim.destroy_item(part).is_err());
        assert!(sim.items().contains(part));
    }

    #[test]
    fn test_unpacked_item_can_move_on() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let q = sim.add_queue(Queue::new("Q"));
        let ids = containers(&mut sim, &["box"]);
        let part = sim.create_item("part");
        sim.container_add(ids[0], part, 0, None).unwrap();
        assert_eq!(sim.container_remove(ids[0], None).unwrap(), Some(part));
        assert_eq!(sim.item(part).unwrap().parent(), None);

        sim.queue_add(q, part).unwrap();
        sim.destroy_item(ids[0]).unwrap();
        assert!(sim.items().contains(part));
    }

    #[test]
    fn test_sink_counts_direct_sends() {
        let mut sim = Simulation::new(SimConfig::default()).unwrap();
        let sink = sim.add_component(ComponentCore::new("Exit"), Sink);
        sim.start().unwrap();
        let item = sim.create_item("a");
        sim.send(item, Destination::Component(sink)).unwrap();

        let core = sim.component_core(sink).unwrap();
        assert_eq!(core.number_added(), 1);
        assert_eq!(core.number_processed(), 1);
        assert!(!sim.items().contains(item));
    }
}
