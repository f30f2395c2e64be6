/// Aggregator - read-side rollups for the dashboard and SLA reports
pub mod rollup;
pub mod sla;

pub use rollup::{DashboardRollup, MonitoringRollup};
pub use sla::{
    HealthScore, MttaReport, MttrReport, ResponseTimeReport, SlaReport, SlaTarget, UptimeReport,
};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::database::Database;
use crate::database::models::EntityKind;
use crate::error::{Error, Result};
use crate::dashboard::sla::{MonitorSample, SlaSnapshot};

pub const DEFAULT_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_SLA_WINDOW_HOURS: i64 = 720;

/// Computes rollups on demand; holds no state of its own
#[derive(Clone)]
pub struct Aggregator {
    database: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    default_window: Duration,
    sla_window: Duration,
    sla: SlaTarget,
}

impl Aggregator {
    pub fn new(
        database: Arc<dyn Database>,
        clock: Arc<dyn Clock>,
        default_window: Duration,
        sla_window: Duration,
        sla: SlaTarget,
    ) -> Self {
        Self { database, clock, default_window, sla_window, sla }
    }

    /// Current time and the start of a trailing window ending at it.
    fn bounds(&self, window: Duration) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        if window <= Duration::zero() {
            return Err(Error::validation("Rollup window must be positive"));
        }

        let now = self.clock.now();
        let window_start = now
            .checked_sub_signed(window)
            .ok_or_else(|| Error::validation("Rollup window is too large"))?;
        Ok((now, window_start))
    }

    /// Full rollup over a trailing window ending now.
    pub async fn dashboard(
        &self,
        project_id: Option<i64>,
        window: Option<Duration>,
    ) -> Result<DashboardRollup> {
        let window = window.unwrap_or(self.default_window);
        let (now, window_start) = self.bounds(window)?;
        let snapshot = self.database.dashboard_snapshot(project_id, window_start, now).await?;
        debug!(?project_id, window_hours = window.num_hours(), "Computed dashboard rollup");

        Ok(DashboardRollup::from_snapshot(&snapshot))
    }

    pub async fn monitoring(
        &self,
        project_id: Option<i64>,
        window: Option<Duration>,
    ) -> Result<MonitoringRollup> {
        Ok(self.dashboard(project_id, window).await?.monitoring)
    }

    async fn sla_snapshot(&self, monitor_id: Option<i64>, window: Duration) -> Result<SlaSnapshot> {
        let (now, window_start) = self.bounds(window)?;
        self.database.sla_snapshot(monitor_id, window_start, now).await
    }

    async fn monitor_sample(&self, monitor_id: i64, window: Duration) -> Result<MonitorSample> {
        self.sla_snapshot(Some(monitor_id), window)
            .await?
            .monitors
            .into_iter()
            .next()
            .ok_or(Error::NotFound { entity: EntityKind::Monitor, id: monitor_id })
    }

    /// SLA compliance over the window, defaulting to the configured SLA period.
    pub async fn sla_report(
        &self,
        monitor_id: Option<i64>,
        window: Option<Duration>,
    ) -> Result<SlaReport> {
        let window = window.unwrap_or(self.sla_window);
        let snapshot = self.sla_snapshot(monitor_id, window).await?;
        if let (Some(id), true) = (monitor_id, snapshot.monitors.is_empty()) {
            return Err(Error::NotFound { entity: EntityKind::Monitor, id });
        }

        debug!(?monitor_id, window_hours = window.num_hours(), "Computed SLA report");
        Ok(SlaReport::from_snapshot(&snapshot, &self.sla))
    }

    pub async fn monitor_uptime(&self, monitor_id: i64, window: Option<Duration>) -> Result<UptimeReport> {
        let window = window.unwrap_or(self.default_window);
        let sample = self.monitor_sample(monitor_id, window).await?;
        Ok(UptimeReport::new(&sample, window.num_hours(), &self.sla))
    }

    pub async fn response_times(
        &self,
        monitor_id: i64,
        window: Option<Duration>,
    ) -> Result<ResponseTimeReport> {
        let window = window.unwrap_or(self.default_window);
        let sample = self.monitor_sample(monitor_id, window).await?;
        Ok(ResponseTimeReport::new(&sample, window.num_hours(), &self.sla))
    }

    pub async fn mtta(&self, window: Option<Duration>) -> Result<MttaReport> {
        let window = window.unwrap_or(self.sla_window);
        let snapshot = self.sla_snapshot(None, window).await?;
        Ok(MttaReport::new(&snapshot.incidents, window.num_hours(), &self.sla))
    }

    pub async fn mttr(&self, window: Option<Duration>) -> Result<MttrReport> {
        let window = window.unwrap_or(self.sla_window);
        let snapshot = self.sla_snapshot(None, window).await?;
        Ok(MttrReport::new(&snapshot.incidents, window.num_hours(), &self.sla))
    }

    /// Health score over the dashboard window.
    pub async fn health_score(&self) -> Result<HealthScore> {
        let report = self.sla_report(None, Some(self.default_window)).await?;
        Ok(HealthScore::from_report(&report))
    }
}
