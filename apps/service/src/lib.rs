//! Vigil - endpoint monitoring and incident engine
//!
//! Probes monitored endpoints on a schedule, tracks their up/down status,
//! opens and resolves incidents on status changes and computes dashboard
//! rollups over the stored history.

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod database;
pub mod error;
pub mod incidents;
pub mod monitoring;
pub mod orchestrator;
pub mod pool;
pub mod service;
pub mod validation;

pub use error::{Error, Result};
pub use service::{CheckSummary, VigilService};
