/// Monitoring engine - probing targets and tracking their status
///
/// The scheduler fires probes on each monitor's interval, the executor runs
/// them with a hard timeout, and the tracker folds results into monitor
/// status and emits transitions for the incident side.
pub mod checker;
pub mod executor;
pub mod guards;
pub mod runner;
pub mod scheduler;
pub mod tracker;
pub mod types;

pub use checker::{Checker, HttpChecker};
pub use executor::ProbeExecutor;
pub use guards::ProbeGuards;
pub use runner::ProbeRunner;
pub use scheduler::{MonitoringScheduler, ScheduledMonitor, SchedulerConfig, SchedulerHandle};
pub use tracker::StatusTracker;
pub use types::{MonitorStatus, ProbeResult, Transition, TransitionKind};
