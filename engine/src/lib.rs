//! Flow Simulator Core - Rust Engine
//!
//! Discrete-event simulation kernel with a process-flow layer on top.
//!
//! # Architecture
//!
//! - **core**: Time base and error types
//! - **events**: Event queue, virtual clock and cancellation handles
//! - **process**: Cooperative processes and their scheduler
//! - **models**: Queues, resources, items and the domain event log
//! - **providers**: Sample/string providers and the rendering observer
//! - **components**: Process-flow components (generator, server, seize,
//!   release, pack, unpack, assemble, sink)
//! - **orchestrator**: Simulation context, model configuration, reports
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Events at the same tick fire in (priority band, insertion sequence) order
//! 2. All randomness is deterministic (seeded RNG)
//! 3. Precondition violations halt the run; "not ready" is never an error

// Module declarations
pub mod components;
pub mod core;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod providers;
pub mod rng;

// Re-exports for convenience
pub use components::{Component, ComponentCore, LinkedService, ServiceState};
pub use core::error::{SimError, SimResult};
pub use core::time::{SimTime, TimeBase};
pub use events::{Action, EventHandle, EventQueue, Priority};
pub use models::{
    ComponentId, Destination, Event, EventLog, ItemId, OrderedMultiSet, Queue, QueueId, Resource, ResourceId,
    SetError,
};
pub use orchestrator::{ModelConfig, RunReport, SimConfig, Simulation};
pub use process::{Process, ProcessId, Step};
pub use rng::RngManager;
