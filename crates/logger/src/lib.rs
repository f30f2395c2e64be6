//! Shared `tracing` setup for the vigil binaries.

mod tracing;

pub use crate::tracing::init_tracing;
