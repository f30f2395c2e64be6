use std::sync::Arc;

use tracing::error;

use super::executor::ProbeExecutor;
use super::guards::ProbeGuards;
use super::scheduler::{ProbeDispatch, ScheduledMonitor};
use super::tracker::StatusTracker;
use super::types::ProbeResult;
use crate::database::models::Monitor;
use crate::error::Result;

/// Glue between the scheduler and the probe pipeline: execute, then record
pub struct ProbeRunner {
    executor: ProbeExecutor,
    tracker: StatusTracker,
    guards: ProbeGuards,
}

impl ProbeRunner {
    pub fn new(executor: ProbeExecutor, tracker: StatusTracker, guards: ProbeGuards) -> Self {
        Self { executor, tracker, guards }
    }

    async fn probe_and_record(&self, monitor_id: i64, target: &str) -> Result<ProbeResult> {
        let result = self.executor.execute(monitor_id, target).await;
        self.tracker.record(&result).await?;
        Ok(result)
    }

    /// Probe a monitor right now, outside its schedule.
    ///
    /// Waits for a scheduled probe of the same monitor to finish first, so the
    /// two never overlap.
    pub async fn check_now(&self, monitor: &Monitor) -> Result<ProbeResult> {
        let _in_flight = self.guards.guard(monitor.id).lock_owned().await;
        self.probe_and_record(monitor.id, &monitor.target).await
    }
}

#[async_trait::async_trait]
impl ProbeDispatch for ProbeRunner {
    async fn dispatch(&self, monitor: &ScheduledMonitor) {
        if let Err(e) = self.probe_and_record(monitor.id, &monitor.target).await {
            error!(monitor_id = monitor.id, "Failed to record probe result: {}", e);
        }
    }
}
