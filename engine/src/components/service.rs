//! LinkedService state machine
//!
//! Every service component (Server, Pack, ConditionPack, Unpack,
//! Assemble) implements the four-method [`LinkedService`] capability and
//! is driven through the same cycle:
//!
//! ```text
//!            notification / poll
//!   Idle ──────────────────────────▶ Starting
//!    ▲     is_ready_to_start()          │ start_processing() == true
//!    │                                  ▼
//!    │                            Processing(k) ──┐ step timer fires,
//!    │                                  │         │ process_step() == Continue
//!    │            process_step()        │ ◀───────┘ (k + 1)
//!    │            == Released           ▼
//!    └──────────────────────────── Releasing
//! ```
//!
//! A failed guard leaves the component parked in `Idle` until the next
//! contents-changed or resource-released notification; there is no
//! polling. The gate (`open`) is part of the guard.

use crate::core::error::{SimError, SimResult};
use crate::events::{Action, EventHandle, Priority};
use crate::models::{ComponentId, Event};
use crate::orchestrator::Simulation;
use crate::providers::{plain_string, EvalContext, StringSample};
use serde::Serialize;
use std::fmt;

/// State of a service component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    Idle,
    Starting,
    /// Waiting for the completion of step `k` (1-based) of the cycle
    Processing { step: u32 },
    Releasing,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Idle => write!(f, "Idle"),
            ServiceState::Starting => write!(f, "Starting"),
            ServiceState::Processing { step } => write!(f, "Processing({})", step),
            ServiceState::Releasing => write!(f, "Releasing"),
        }
    }
}

/// Outcome of one completed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// More steps are needed for this cycle
    Continue,
    /// The cycle's output was sent downstream
    Released,
}

/// State shared by every service component
pub struct ServiceCore {
    state: ServiceState,
    open: bool,
    step_handle: Option<EventHandle>,
    match_provider: Option<StringSample>,
    /// Match value chosen for the current cycle
    match_value: Option<String>,
    cycles: u64,
}

impl Default for ServiceCore {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceCore {
    pub fn new() -> Self {
        Self {
            state: ServiceState::Idle,
            open: true,
            step_handle: None,
            match_provider: None,
            match_value: None,
            cycles: 0,
        }
    }

    pub fn with_match(provider: StringSample) -> Self {
        Self {
            match_provider: Some(provider),
            ..Self::new()
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_idle(&self) -> bool {
        self.state == ServiceState::Idle
    }

    /// Completion event of the step in progress
    pub fn pending_step(&self) -> Option<EventHandle> {
        self.step_handle
    }

    /// Completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn has_match(&self) -> bool {
        self.match_provider.is_some()
    }

    pub(crate) fn set_open(&mut self, open: bool) {
        self.open = open;
    }

    pub(crate) fn set_match_provider(&mut self, provider: StringSample) {
        self.match_provider = Some(provider);
    }

    /// Match value for the current cycle, evaluated once per cycle
    pub(crate) fn cycle_match(&mut self, sim: &Simulation) -> Option<String> {
        if self.match_value.is_none() {
            if let Some(provider) = &self.match_provider {
                let ctx = EvalContext::new(sim, None);
                self.match_value = Some(plain_string(provider.as_ref(), &ctx));
            }
        }
        self.match_value.clone()
    }

    /// Match value already chosen, without evaluating the provider
    pub(crate) fn current_match(&self) -> Option<&str> {
        self.match_value.as_deref()
    }

    pub(crate) fn end_cycle(&mut self) {
        self.match_value = None;
        self.cycles += 1;
    }
}

/// Capability implemented by every service component
pub trait LinkedService {
    fn service(&self) -> &ServiceCore;

    fn service_mut(&mut self) -> &mut ServiceCore;

    /// Guard of `Idle -> Starting`; the gate is checked by the driver
    fn is_ready_to_start(&mut self, sim: &Simulation, id: ComponentId) -> SimResult<bool>;

    /// Claim the input of the next step; `false` means "not ready"
    fn start_processing(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<bool>;

    /// Duration of the next step in seconds
    fn step_duration(&mut self, sim: &Simulation, id: ComponentId) -> SimResult<f64>;

    /// Complete a step
    fn process_step(&mut self, sim: &mut Simulation, id: ComponentId) -> SimResult<StepOutcome>;
}

pub(crate) fn transition<S: LinkedService + ?Sized>(
    s: &mut S,
    sim: &mut Simulation,
    id: ComponentId,
    to: ServiceState,
) -> SimResult<()> {
    let from = s.service().state;
    s.service_mut().state = to;
    let name = sim.component_core(id)?.name().to_string();
    log::debug!("{} {}: {} -> {}", sim.now(), name, from, to);
    sim.log_event(Event::ServiceTransition {
        tick: sim.now().ticks(),
        component: name,
        from: from.to_string(),
        to: to.to_string(),
    });
    Ok(())
}

/// Re-evaluate an idle service after a notification
pub(crate) fn restart<S: LinkedService + ?Sized>(
    s: &mut S,
    sim: &mut Simulation,
    id: ComponentId,
) -> SimResult<()> {
    if !s.service().is_idle() || !s.service().is_open() {
        return Ok(());
    }
    if !s.is_ready_to_start(sim, id)? {
        return Ok(());
    }
    transition(s, sim, id, ServiceState::Starting)?;
    if !s.start_processing(sim, id)? {
        return transition(s, sim, id, ServiceState::Idle);
    }
    schedule_step(s, sim, id, 1)
}

fn schedule_step<S: LinkedService + ?Sized>(
    s: &mut S,
    sim: &mut Simulation,
    id: ComponentId,
    step: u32,
) -> SimResult<()> {
    let secs = s.step_duration(sim, id)?;
    let ticks = sim
        .time_base()
        .seconds_to_ticks(secs)
        .ok_or(SimError::InvalidDuration(secs))?;
    let handle = sim.schedule_ticks(ticks, Priority::ServiceStep, true, Action::EndStep(id))?;
    s.service_mut().step_handle = Some(handle);
    transition(s, sim, id, ServiceState::Processing { step })
}

/// Handle the completion of the current step
pub(crate) fn end_step<S: LinkedService + ?Sized>(
    s: &mut S,
    sim: &mut Simulation,
    id: ComponentId,
) -> SimResult<()> {
    let step = match s.service().state {
        ServiceState::Processing { step } => step,
        _ => return Ok(()),
    };
    s.service_mut().step_handle = None;

    match s.process_step(sim, id)? {
        StepOutcome::Continue => {
            let ready = s.service().is_open() && s.is_ready_to_start(sim, id)?;
            if ready && s.start_processing(sim, id)? {
                schedule_step(s, sim, id, step + 1)
            } else {
                // Parked mid-cycle; the cycle resumes on the next notification
                transition(s, sim, id, ServiceState::Idle)
            }
        }
        StepOutcome::Released => {
            transition(s, sim, id, ServiceState::Releasing)?;
            s.service_mut().end_cycle();
            transition(s, sim, id, ServiceState::Idle)?;
            restart(s, sim, id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ServiceState::Processing { step: 2 }.to_string(), "Processing(2)");
        assert_eq!(ServiceState::Idle.to_string(), "Idle");
    }

    #[test]
    fn test_new_service_is_idle_and_open() {
        let core = ServiceCore::new();
        assert!(core.is_idle());
        assert!(core.is_open());
        assert_eq!(core.cycles(), 0);
        assert!(!core.has_match());
    }
}
