//! Event scheduling
//!
//! The [`EventQueue`] is the simulation clock: it holds every pending
//! action ordered by `(tick, priority band, signed insertion sequence)`
//! and advances virtual time as events are popped. [`EventHandle`]s let
//! callers cancel a pending action at most once; cancelling a handle
//! whose event already fired (or was already cancelled) is a no-op.

pub mod action;
pub mod priority;
pub mod queue;

pub use action::Action;
pub use priority::Priority;
pub use queue::{EventHandle, EventKey, EventQueue};
