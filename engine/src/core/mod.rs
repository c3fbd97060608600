//! Core kernel types: virtual time and the kernel-wide error type

pub mod error;
pub mod time;
