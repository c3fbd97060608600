//! Orchestrator - simulation context, model building and reporting
//!
//! - [`simulation`]: the [`Simulation`] context and its event loop
//! - [`config`]: serde model description and the builder
//! - [`report`]: end-of-run summary

pub mod config;
pub mod report;
pub mod simulation;

// Re-export main types for convenience
pub use config::{
    ComponentConfig, ComponentKind, Distribution, MatchConfig, ModelConfig, QueueConfig, RenegeSpec, ResourceConfig,
    SampleConfig,
};
pub use report::{ComponentSummary, QueueSummary, ResourceSummary, RunReport};
pub use simulation::{SimConfig, Simulation};
