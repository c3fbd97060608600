//! Collaborator interfaces consumed by the kernel
//!
//! The kernel never parses or interprets expressions. Anything that
//! produces a number or a string per evaluation (service times, queue
//! priorities, match values, renege conditions) is a provider:
//!
//! - [`SampleProvider`]: `next_sample(ctx) -> f64`
//! - [`StringProvider`]: `next_string(ctx, fmt, unit_factor, as_integer) -> String`
//!
//! Providers may read model state through the [`EvalContext`] but can
//! never mutate it and never suspend. Providers that keep their own
//! state (sequences, random streams) use interior mutability.
//!
//! [`PositionObserver`] is the one-way channel towards a renderer; the
//! kernel never reads anything back from it.

use crate::core::time::SimTime;
use crate::models::{ItemId, QueueId, ResourceId};
use crate::orchestrator::Simulation;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};

/// Read-only view of the simulation handed to providers
///
/// `current` is the item the evaluation is about (the arriving item for
/// a queue priority, the reneging item for a renege condition, the
/// container for a pack release condition).
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    sim: &'a Simulation,
    current: Option<ItemId>,
}

impl<'a> EvalContext<'a> {
    pub fn new(sim: &'a Simulation, current: Option<ItemId>) -> Self {
        Self { sim, current }
    }

    pub fn sim(&self) -> &'a Simulation {
        self.sim
    }

    /// Current time in seconds
    pub fn sim_time(&self) -> f64 {
        self.sim.now_seconds()
    }

    pub fn now(&self) -> SimTime {
        self.sim.now()
    }

    pub fn current(&self) -> Option<ItemId> {
        self.current
    }

    /// Name of the current item
    pub fn current_name(&self) -> Option<&'a str> {
        let id = self.current?;
        self.sim.items().get(id).map(|i| i.name())
    }

    /// State of the current item
    pub fn current_state(&self) -> Option<&'a str> {
        let id = self.current?;
        self.sim.items().get(id).and_then(|i| i.state())
    }

    /// Number of items inside the current item, if it is a container
    pub fn current_contents(&self) -> usize {
        self.current
            .and_then(|id| self.sim.items().get(id))
            .and_then(|i| i.storage())
            .map_or(0, |s| s.count(None))
    }

    pub fn queue_length(&self, queue: QueueId) -> usize {
        self.sim.queue(queue).map_or(0, |q| q.len())
    }

    pub fn available_units(&self, resource: ResourceId) -> u32 {
        self.sim.resource(resource).map_or(0, |r| r.available_units())
    }
}

/// Source of numeric samples
pub trait SampleProvider {
    fn next_sample(&self, ctx: &EvalContext<'_>) -> f64;
}

/// Source of strings (match values, labels)
pub trait StringProvider {
    /// Produce the next string
    ///
    /// `fmt` may contain one `{}` placeholder for numeric providers;
    /// numbers are divided by `unit_factor` and truncated when
    /// `as_integer` is set.
    fn next_string(
        &self,
        ctx: &EvalContext<'_>,
        fmt: Option<&str>,
        unit_factor: f64,
        as_integer: bool,
    ) -> String;
}

pub type Sample = Box<dyn SampleProvider>;
pub type StringSample = Box<dyn StringProvider>;

/// Evaluate a string provider with no formatting
pub fn plain_string(provider: &dyn StringProvider, ctx: &EvalContext<'_>) -> String {
    provider.next_string(ctx, None, 1.0, false)
}

// ============================================================================
// Numeric providers
// ============================================================================

/// Always the same value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant(pub f64);

impl SampleProvider for Constant {
    fn next_sample(&self, _ctx: &EvalContext<'_>) -> f64 {
        self.0
    }
}

/// Cycles through a fixed list of values
#[derive(Debug, Clone)]
pub struct Sequence {
    values: Vec<f64>,
    next: Cell<usize>,
}

impl Sequence {
    /// # Panics
    /// Panics if `values` is empty.
    pub fn new(values: Vec<f64>) -> Self {
        assert!(!values.is_empty(), "sequence needs at least one value");
        Self {
            values,
            next: Cell::new(0),
        }
    }
}

impl SampleProvider for Sequence {
    fn next_sample(&self, _ctx: &EvalContext<'_>) -> f64 {
        let i = self.next.get();
        self.next.set((i + 1) % self.values.len());
        self.values[i]
    }
}

/// Wraps a closure over the evaluation context
pub struct FromFn<F>(pub F);

impl<F> SampleProvider for FromFn<F>
where
    F: Fn(&EvalContext<'_>) -> f64,
{
    fn next_sample(&self, ctx: &EvalContext<'_>) -> f64 {
        (self.0)(ctx)
    }
}

/// Uniform distribution on `[min, max)` drawn from its own stream
#[derive(Debug)]
pub struct Uniform {
    min: f64,
    max: f64,
    rng: RefCell<RngManager>,
}

impl Uniform {
    pub fn new(min: f64, max: f64, seed: u64) -> Self {
        Self {
            min,
            max,
            rng: RefCell::new(RngManager::new(seed)),
        }
    }
}

impl SampleProvider for Uniform {
    fn next_sample(&self, _ctx: &EvalContext<'_>) -> f64 {
        let u = self.rng.borrow_mut().next_f64();
        self.min + (self.max - self.min) * u
    }
}

/// Exponential distribution with the given mean
#[derive(Debug)]
pub struct Exponential {
    mean: f64,
    rng: RefCell<RngManager>,
}

impl Exponential {
    pub fn new(mean: f64, seed: u64) -> Self {
        Self {
            mean,
            rng: RefCell::new(RngManager::new(seed)),
        }
    }
}

impl SampleProvider for Exponential {
    fn next_sample(&self, _ctx: &EvalContext<'_>) -> f64 {
        let u = self.rng.borrow_mut().next_f64();
        // u is in [0, 1), so 1 - u is never zero
        -self.mean * (1.0 - u).ln()
    }
}

// ============================================================================
// String providers
// ============================================================================

/// Always the same string
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantString(pub String);

impl StringProvider for ConstantString {
    fn next_string(&self, _ctx: &EvalContext<'_>, _fmt: Option<&str>, _unit: f64, _int: bool) -> String {
        self.0.clone()
    }
}

/// Cycles through a fixed list of strings
#[derive(Debug, Clone)]
pub struct CycleString {
    values: Vec<String>,
    next: Cell<usize>,
}

impl CycleString {
    /// # Panics
    /// Panics if `values` is empty.
    pub fn new(values: Vec<String>) -> Self {
        assert!(!values.is_empty(), "cycle needs at least one value");
        Self {
            values,
            next: Cell::new(0),
        }
    }
}

impl StringProvider for CycleString {
    fn next_string(&self, _ctx: &EvalContext<'_>, _fmt: Option<&str>, _unit: f64, _int: bool) -> String {
        let i = self.next.get();
        self.next.set((i + 1) % self.values.len());
        self.values[i].clone()
    }
}

/// Renders a numeric provider as a string
pub struct NumberString(pub Sample);

impl StringProvider for NumberString {
    fn next_string(
        &self,
        ctx: &EvalContext<'_>,
        fmt: Option<&str>,
        unit_factor: f64,
        as_integer: bool,
    ) -> String {
        let value = self.0.next_sample(ctx) / unit_factor;
        let text = if as_integer {
            format!("{}", value.trunc() as i64)
        } else {
            format!("{}", value)
        };
        match fmt {
            Some(f) if f.contains("{}") => f.replacen("{}", &text, 1),
            _ => text,
        }
    }
}

/// Wraps a closure producing strings
pub struct StringFromFn<F>(pub F);

impl<F> StringProvider for StringFromFn<F>
where
    F: Fn(&EvalContext<'_>) -> String,
{
    fn next_string(&self, ctx: &EvalContext<'_>, _fmt: Option<&str>, _unit: f64, _int: bool) -> String {
        (self.0)(ctx)
    }
}

// ============================================================================
// Rendering collaborator
// ============================================================================

/// A point in model space
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Receives item positions whenever a queue is re-laid out
pub trait PositionObserver {
    fn position_update(&mut self, item: ItemId, position: Vec3);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{SimConfig, Simulation};

    #[test]
    fn test_sequence_and_cycle_wrap() {
        let sim = Simulation::new(SimConfig::default()).unwrap();
        let ctx = EvalContext::new(&sim, None);

        let seq = Sequence::new(vec![1.0, 2.0]);
        let drawn: Vec<f64> = (0..3).map(|_| seq.next_sample(&ctx)).collect();
        assert_eq!(drawn, vec![1.0, 2.0, 1.0]);

        let cycle = CycleString::new(vec!["A".into(), "B".into()]);
        let drawn: Vec<String> = (0..3).map(|_| plain_string(&cycle, &ctx)).collect();
        assert_eq!(drawn, vec!["A", "B", "A"]);
    }

    #[test]
    fn test_number_string_formatting() {
        let sim = Simulation::new(SimConfig::default()).unwrap();
        let ctx = EvalContext::new(&sim, None);
        let provider = NumberString(Box::new(Constant(7.5)));

        assert_eq!(provider.next_string(&ctx, None, 1.0, false), "7.5");
        assert_eq!(provider.next_string(&ctx, None, 1.0, true), "7");
        assert_eq!(provider.next_string(&ctx, Some("lane-{}"), 0.5, true), "lane-15");
    }

    #[test]
    fn test_random_providers_are_seed_deterministic() {
        let sim = Simulation::new(SimConfig::default()).unwrap();
        let ctx = EvalContext::new(&sim, None);

        let a = Exponential::new(2.0, 42);
        let b = Exponential::new(2.0, 42);
        for _ in 0..50 {
            let x = a.next_sample(&ctx);
            assert!(x >= 0.0);
            assert_eq!(x, b.next_sample(&ctx));
        }

        let u = Uniform::new(3.0, 5.0, 7);
        for _ in 0..50 {
            let x = u.next_sample(&ctx);
            assert!((3.0..5.0).contains(&x));
        }
    }
}
