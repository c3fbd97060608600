//! Declarative model configuration
//!
//! A [`ModelConfig`] describes queues, resources and components by name
//! and is read from JSON. [`Simulation::from_config`] resolves the names
//! to indices, builds the providers and validates the result; every
//! problem is reported as `SimError::InvalidConfig` before the first
//! event fires.
//!
//! ```json
//! {
//!   "simulation": { "ticks_per_second": 1000, "rng_seed": 42 },
//!   "queues": [ { "name": "Waiting" } ],
//!   "resources": [ { "name": "Clerk", "capacity": 2 } ],
//!   "components": [
//!     { "name": "Arrivals", "type": "generator", "next": "Desk",
//!       "inter_arrival": { "dist": "exponential", "mean": 4.0 }, "max_count": 100 },
//!     { "name": "Desk", "type": "server", "next": "Exit",
//!       "wait_queue": "Waiting", "service_time": 3.0 },
//!     { "name": "Exit", "type": "sink" }
//!   ]
//! }
//! ```
//!
//! Samples are a number (constant), a list (cycled) or a distribution
//! object; match values are a string or a list of strings (cycled).

use crate::components::{
    Assemble, Component, ComponentCore, ConditionPack, Generator, Pack, Release, Seize, Server, Sink, Unpack,
};
use crate::core::error::{SimError, SimResult};
use crate::models::{ComponentId, Destination, Queue, QueueId, RenegeConfig, Resource, ResourceId};
use crate::orchestrator::simulation::{SimConfig, Simulation};
use crate::providers::{Constant, ConstantString, CycleString, Exponential, Sample, Sequence, StringSample, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Providers
// ============================================================================

/// Random distribution of a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dist", rename_all = "snake_case")]
pub enum Distribution {
    /// Uniform on `[min, max)`
    Uniform { min: f64, max: f64 },
    /// Exponential with the given mean
    Exponential { mean: f64 },
}

/// Numeric sample source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleConfig {
    Constant(f64),
    Sequence(Vec<f64>),
    Distribution(Distribution),
}

impl SampleConfig {
    /// Build the provider; random distributions get their own stream
    pub fn build(&self, sim: &mut Simulation) -> SimResult<Sample> {
        Ok(match self {
            SampleConfig::Constant(v) => Box::new(Constant(*v)),
            SampleConfig::Sequence(values) => {
                if values.is_empty() {
                    return Err(SimError::InvalidConfig("empty sample sequence".to_string()));
                }
                Box::new(Sequence::new(values.clone()))
            }
            SampleConfig::Distribution(Distribution::Uniform { min, max }) => {
                if !(min.is_finite() && max.is_finite() && min <= max) {
                    return Err(SimError::InvalidConfig(format!("uniform min {} exceeds max {}", min, max)));
                }
                Box::new(Uniform::new(*min, *max, sim.derive_seed()))
            }
            SampleConfig::Distribution(Distribution::Exponential { mean }) => {
                if !(mean.is_finite() && *mean > 0.0) {
                    return Err(SimError::InvalidConfig(format!("exponential mean must be > 0, got {}", mean)));
                }
                Box::new(Exponential::new(*mean, sim.derive_seed()))
            }
        })
    }
}

/// Match value source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchConfig {
    Constant(String),
    Cycle(Vec<String>),
}

impl MatchConfig {
    pub fn build(&self) -> SimResult<StringSample> {
        Ok(match self {
            MatchConfig::Constant(s) => Box::new(ConstantString(s.clone())),
            MatchConfig::Cycle(values) => {
                if values.is_empty() {
                    return Err(SimError::InvalidConfig("empty match value cycle".to_string()));
                }
                Box::new(CycleString::new(values.clone()))
            }
        })
    }
}

// ============================================================================
// Model
// ============================================================================

/// Renege settings of a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenegeSpec {
    /// Seconds after arrival
    pub time: SampleConfig,
    /// Non-zero means leave; absent means always leave
    #[serde(default)]
    pub condition: Option<SampleConfig>,
    /// Queue or component receiving reneging items
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default)]
    pub lifo: bool,
    #[serde(default)]
    pub priority: Option<SampleConfig>,
    #[serde(default)]
    pub match_value: Option<MatchConfig>,
    #[serde(default)]
    pub renege: Option<RenegeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub capacity: u32,
}

/// Variant-specific settings of a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentKind {
    Generator {
        inter_arrival: SampleConfig,
        #[serde(default)]
        first_arrival: Option<SampleConfig>,
        #[serde(default)]
        max_count: Option<u64>,
    },
    Server {
        wait_queue: String,
        service_time: SampleConfig,
        #[serde(default)]
        match_value: Option<MatchConfig>,
    },
    Seize {
        wait_queue: String,
        resources: Vec<String>,
        units: Vec<u32>,
        #[serde(default)]
        match_value: Option<MatchConfig>,
    },
    Release {
        resources: Vec<String>,
        units: Vec<u32>,
    },
    Pack {
        wait_queue: String,
        number_of_entities: SampleConfig,
        #[serde(default)]
        number_to_start: Option<SampleConfig>,
        service_time: SampleConfig,
        #[serde(default)]
        match_value: Option<MatchConfig>,
        #[serde(default)]
        lifo_containers: bool,
    },
    ConditionPack {
        wait_queue: String,
        number_of_entities: SampleConfig,
        #[serde(default)]
        number_to_start: Option<SampleConfig>,
        service_time: SampleConfig,
        release_condition: SampleConfig,
        #[serde(default)]
        match_value: Option<MatchConfig>,
    },
    Unpack {
        wait_queue: String,
        service_time: SampleConfig,
        #[serde(default)]
        match_value: Option<MatchConfig>,
        #[serde(default)]
        match_for_entities: Option<MatchConfig>,
    },
    Assemble {
        wait_queues: Vec<String>,
        required: Vec<usize>,
        service_time: SampleConfig,
        #[serde(default)]
        match_required: bool,
        #[serde(default)]
        match_value: Option<MatchConfig>,
    },
    Sink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    /// Queue or component receiving finished items
    #[serde(default)]
    pub next: Option<String>,
    /// State given to every received item
    #[serde(default)]
    pub state_assignment: Option<String>,
    #[serde(flatten)]
    pub kind: ComponentKind,
}

/// Complete model description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub simulation: SimConfig,
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    pub components: Vec<ComponentConfig>,
}

impl ModelConfig {
    /// Parse a model from JSON
    pub fn from_json(json: &str) -> SimResult<Self> {
        serde_json::from_str(json).map_err(|e| SimError::InvalidConfig(format!("model parse error: {}", e)))
    }

    pub fn to_json(&self) -> SimResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Serialization(e.to_string()))
    }

    /// Check that names are unique and present
    pub fn validate(&self) -> SimResult<()> {
        if self.components.is_empty() {
            return Err(SimError::InvalidConfig("model has no components".to_string()));
        }

        let names = self
            .queues
            .iter()
            .map(|q| q.name.as_str())
            .chain(self.resources.iter().map(|r| r.name.as_str()))
            .chain(self.components.iter().map(|c| c.name.as_str()));
        let mut seen = BTreeSet::new();
        for name in names {
            if name.is_empty() {
                return Err(SimError::InvalidConfig("empty name".to_string()));
            }
            if !seen.insert(name) {
                return Err(SimError::InvalidConfig(format!("duplicate name: {}", name)));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Building
// ============================================================================

/// Name tables of a model being built
struct Names {
    queues: BTreeMap<String, QueueId>,
    resources: BTreeMap<String, ResourceId>,
    components: BTreeMap<String, usize>,
}

impl Names {
    fn new(config: &ModelConfig) -> Self {
        Self {
            queues: config
                .queues
                .iter()
                .enumerate()
                .map(|(i, q)| (q.name.clone(), QueueId(i)))
                .collect(),
            resources: config
                .resources
                .iter()
                .enumerate()
                .map(|(i, r)| (r.name.clone(), ResourceId(i)))
                .collect(),
            components: config
                .components
                .iter()
                .enumerate()
                .map(|(i, c)| (c.name.clone(), i))
                .collect(),
        }
    }

    fn queue(&self, owner: &str, name: &str) -> SimResult<QueueId> {
        self.queues
            .get(name)
            .copied()
            .ok_or_else(|| SimError::InvalidConfig(format!("{}: unknown queue {}", owner, name)))
    }

    fn resources(&self, owner: &str, names: &[String]) -> SimResult<Vec<ResourceId>> {
        names
            .iter()
            .map(|name| {
                self.resources
                    .get(name)
                    .copied()
                    .ok_or_else(|| SimError::InvalidConfig(format!("{}: unknown resource {}", owner, name)))
            })
            .collect()
    }

    fn destination(&self, owner: &str, name: &str) -> SimResult<Destination> {
        if let Some(q) = self.queues.get(name) {
            return Ok(Destination::Queue(*q));
        }
        match self.components.get(name) {
            Some(i) => Ok(Destination::Component(ComponentId(*i))),
            None => Err(SimError::InvalidConfig(format!("{}: unknown destination {}", owner, name))),
        }
    }
}

fn build_match(config: &Option<MatchConfig>) -> SimResult<Option<StringSample>> {
    config.as_ref().map(MatchConfig::build).transpose()
}

fn build_sample(config: &Option<SampleConfig>, sim: &mut Simulation) -> SimResult<Option<Sample>> {
    config.as_ref().map(|c| c.build(sim)).transpose()
}

fn build_queue(config: &QueueConfig, names: &Names, sim: &mut Simulation) -> SimResult<Queue> {
    let mut queue = Queue::new(config.name.clone());
    if config.lifo {
        queue = queue.lifo();
    }
    if let Some(priority) = build_sample(&config.priority, sim)? {
        queue = queue.with_priority(priority);
    }
    if let Some(provider) = build_match(&config.match_value)? {
        queue = queue.with_match(provider);
    }
    if let Some(renege) = &config.renege {
        queue = queue.with_renege(RenegeConfig {
            time: renege.time.build(sim)?,
            condition: build_sample(&renege.condition, sim)?,
            destination: names.destination(&config.name, &renege.destination)?,
        });
    }
    Ok(queue)
}

fn build_component(config: &ComponentConfig, names: &Names, sim: &mut Simulation) -> SimResult<Component> {
    let owner = config.name.as_str();
    let component: Component = match &config.kind {
        ComponentKind::Generator {
            inter_arrival,
            first_arrival,
            max_count,
        } => {
            let mut g = Generator::new(inter_arrival.build(sim)?);
            if let Some(first) = build_sample(first_arrival, sim)? {
                g = g.with_first_arrival(first);
            }
            if let Some(max) = max_count {
                g = g.with_max_count(*max);
            }
            g.into()
        }
        ComponentKind::Server {
            wait_queue,
            service_time,
            match_value,
        } => {
            let mut s = Server::new(names.queue(owner, wait_queue)?, service_time.build(sim)?);
            if let Some(m) = build_match(match_value)? {
                s = s.with_match(m);
            }
            s.into()
        }
        ComponentKind::Seize {
            wait_queue,
            resources,
            units,
            match_value,
        } => {
            let mut s = Seize::new(
                names.queue(owner, wait_queue)?,
                names.resources(owner, resources)?,
                units.clone(),
            );
            if let Some(m) = build_match(match_value)? {
                s = s.with_match(m);
            }
            s.into()
        }
        ComponentKind::Release { resources, units } => {
            Release::new(names.resources(owner, resources)?, units.clone()).into()
        }
        ComponentKind::Pack {
            wait_queue,
            number_of_entities,
            number_to_start,
            service_time,
            match_value,
            lifo_containers,
        } => {
            let mut p = Pack::new(
                names.queue(owner, wait_queue)?,
                number_of_entities.build(sim)?,
                service_time.build(sim)?,
            );
            if let Some(n) = build_sample(number_to_start, sim)? {
                p = p.with_number_to_start(n);
            }
            if let Some(m) = build_match(match_value)? {
                p = p.with_match(m);
            }
            if *lifo_containers {
                p = p.with_lifo_containers();
            }
            p.into()
        }
        ComponentKind::ConditionPack {
            wait_queue,
            number_of_entities,
            number_to_start,
            service_time,
            release_condition,
            match_value,
        } => {
            let mut p = ConditionPack::new(
                names.queue(owner, wait_queue)?,
                number_of_entities.build(sim)?,
                service_time.build(sim)?,
                release_condition.build(sim)?,
            );
            if let Some(n) = build_sample(number_to_start, sim)? {
                p = p.with_number_to_start(n);
            }
            if let Some(m) = build_match(match_value)? {
                p = p.with_match(m);
            }
            p.into()
        }
        ComponentKind::Unpack {
            wait_queue,
            service_time,
            match_value,
            match_for_entities,
        } => {
            let mut u = Unpack::new(names.queue(owner, wait_queue)?, service_time.build(sim)?);
            if let Some(m) = build_match(match_value)? {
                u = u.with_match(m);
            }
            if let Some(m) = build_match(match_for_entities)? {
                u = u.with_match_for_entities(m);
            }
            u.into()
        }
        ComponentKind::Assemble {
            wait_queues,
            required,
            service_time,
            match_required,
            match_value,
        } => {
            let queues = wait_queues
                .iter()
                .map(|q| names.queue(owner, q))
                .collect::<SimResult<Vec<_>>>()?;
            let mut a = Assemble::new(queues, required.clone(), service_time.build(sim)?);
            if *match_required {
                a = a.with_match_required();
            }
            if let Some(m) = build_match(match_value)? {
                a = a.with_match(m);
            }
            a.into()
        }
        ComponentKind::Sink => Sink.into(),
    };
    Ok(component)
}

impl Simulation {
    /// Build and validate a simulation from a model description
    ///
    /// # Example
    ///
    /// ```rust
    /// use flow_simulator_core_rs::orchestrator::{ModelConfig, Simulation};
    ///
    /// let config = ModelConfig::from_json(r#"{
    ///     "simulation": { "ticks_per_second": 1.0 },
    ///     "components": [
    ///         { "name": "Arrivals", "type": "generator", "next": "Exit",
    ///           "inter_arrival": 2.0, "max_count": 3 },
    ///         { "name": "Exit", "type": "sink" }
    ///     ]
    /// }"#).unwrap();
    ///
    /// let mut sim = Simulation::from_config(&config).unwrap();
    /// sim.run().unwrap();
    /// assert_eq!(sim.report().unwrap().items_created, 3);
    /// ```
    pub fn from_config(config: &ModelConfig) -> SimResult<Self> {
        config.validate()?;
        let mut sim = Simulation::new(config.simulation.clone())?;
        let names = Names::new(config);

        for q in &config.queues {
            let queue = build_queue(q, &names, &mut sim)?;
            sim.add_queue(queue);
        }
        for r in &config.resources {
            sim.add_resource(Resource::new(r.name.clone(), r.capacity));
        }
        for c in &config.components {
            let mut core = ComponentCore::new(c.name.clone());
            if let Some(next) = &c.next {
                core = core.with_next(names.destination(&c.name, next)?);
            }
            if let Some(state) = &c.state_assignment {
                core = core.with_state_assignment(state.clone());
            }
            let body = build_component(c, &names, &mut sim)?;
            sim.add_component(core, body);
        }

        sim.validate_model()?;
        log::info!(
            "Built model: {} queues, {} resources, {} components",
            config.queues.len(),
            config.resources.len(),
            config.components.len()
        );
        Ok(sim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_shapes() {
        let c: SampleConfig = serde_json::from_str("3").unwrap();
        assert_eq!(c, SampleConfig::Constant(3.0));
        let c: SampleConfig = serde_json::from_str("[1, 2.5]").unwrap();
        assert_eq!(c, SampleConfig::Sequence(vec![1.0, 2.5]));
        let c: SampleConfig = serde_json::from_str(r#"{"dist": "uniform", "min": 1, "max": 2}"#).unwrap();
        assert_eq!(c, SampleConfig::Distribution(Distribution::Uniform { min: 1.0, max: 2.0 }));
    }

    #[test]
    fn test_component_kind_is_flattened() {
        let c: ComponentConfig = serde_json::from_str(
            r#"{"name": "S", "type": "seize", "next": "R", "wait_queue": "Q",
                "resources": ["Crane"], "units": [1]}"#,
        )
        .unwrap();
        assert_eq!(c.next.as_deref(), Some("R"));
        assert!(matches!(c.kind, ComponentKind::Seize { ref units, .. } if units == &vec![1]));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = ModelConfig {
            simulation: SimConfig::default(),
            queues: vec![QueueConfig {
                name: "A".into(),
                lifo: false,
                priority: None,
                match_value: None,
                renege: None,
            }],
            resources: vec![],
            components: vec![ComponentConfig {
                name: "A".into(),
                next: None,
                state_assignment: None,
                kind: ComponentKind::Sink,
            }],
        };
        assert!(matches!(config.validate(), Err(SimError::InvalidConfig(msg)) if msg.contains("duplicate")));
    }
}
