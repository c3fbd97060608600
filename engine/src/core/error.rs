//! Kernel error types
//!
//! Errors fall into three groups:
//!
//! - **Precondition violations** (removing from an empty queue, adding an
//!   item twice, releasing more units than were seized). These are fatal:
//!   the run halts and no retry is attempted.
//! - **Configuration errors** found while the model is built, before the
//!   first event fires.
//! - Scheduling misuse (negative delays, non-causal times).
//!
//! "Not ready" outcomes are never errors; they are `Ok(false)`.

use crate::core::time::SimTime;
use crate::models::ordered_set::SetError;
use crate::models::resource::ResourceError;
use thiserror::Error;

/// Errors raised by the simulation kernel
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimError {
    #[error("{component}: {operation}: {message}")]
    Precondition {
        component: String,
        operation: &'static str,
        message: String,
    },

    #[error("{component}: {operation}: {source}")]
    Collection {
        component: String,
        operation: &'static str,
        #[source]
        source: SetError,
    },

    #[error("{resource}: {source}")]
    Resource {
        resource: String,
        #[source]
        source: ResourceError,
    },

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot schedule an event at {requested} before the current time {current}")]
    NonCausal { requested: SimTime, current: SimTime },

    #[error("Negative delay of {0} ticks")]
    NegativeDelay(i64),

    #[error("Invalid duration: {0} s")]
    InvalidDuration(f64),

    #[error("Unknown {kind}: {id}")]
    UnknownEntity { kind: &'static str, id: String },

    #[error("Component {0} re-entered while it was already executing")]
    Reentrant(String),

    #[error("Simulation halted after a fatal error")]
    Halted,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SimError {
    /// Build a precondition violation with component and operation context
    pub fn precondition(
        component: impl Into<String>,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        SimError::Precondition {
            component: component.into(),
            operation,
            message: message.into(),
        }
    }

    /// Wrap a collection error with the owning component's context
    pub fn collection(component: impl Into<String>, operation: &'static str, source: SetError) -> Self {
        SimError::Collection {
            component: component.into(),
            operation,
            source,
        }
    }

    /// Wrap a resource error with the resource's name
    pub fn resource(resource: impl Into<String>, source: ResourceError) -> Self {
        SimError::Resource {
            resource: resource.into(),
            source,
        }
    }

    pub(crate) fn unknown(kind: &'static str, id: impl ToString) -> Self {
        SimError::UnknownEntity {
            kind,
            id: id.to_string(),
        }
    }

    /// True for errors that end the run
    ///
    /// Configuration errors are reported before a run starts and are
    /// therefore not considered fatal to a run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SimError::InvalidConfig(_))
    }
}

/// Convenience alias for kernel results
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemId;

    #[test]
    fn test_precondition_display_carries_context() {
        let e = SimError::precondition("Queue1", "remove_first", "queue is empty");
        assert_eq!(e.to_string(), "Queue1: remove_first: queue is empty");
        assert!(e.is_fatal());
    }

    #[test]
    fn test_collection_error_display() {
        let e = SimError::collection("Queue1", "add", SetError::DuplicateItem(ItemId::new(7)));
        assert!(e.to_string().contains("Queue1"));
        assert!(e.to_string().contains("7"));
    }

    #[test]
    fn test_config_error_is_not_fatal() {
        assert!(!SimError::InvalidConfig("x".into()).is_fatal());
    }
}
