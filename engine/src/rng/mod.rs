//! Deterministic random number generation
//!
//! Every random draw in a run goes through an [`RngManager`] seeded from
//! `SimConfig::rng_seed`; nothing reads ambient entropy.

mod xorshift;

pub use xorshift::RngManager;
