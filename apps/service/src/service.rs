use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::clock::Clock;
use crate::dashboard::rollup::ActivityRollup;
use crate::dashboard::{
    Aggregator, DashboardRollup, HealthScore, MonitoringRollup, MttaReport, MttrReport,
    ResponseTimeReport, SlaReport, UptimeReport,
};
use crate::database::Database;
use crate::database::models::{
    AuditEntry, AuditFilter, EntityKind, Incident, IncidentFilter, Monitor, MonitorUpdate,
    NewIncident, NewMonitor, ProbeRecord,
};
use crate::error::{Error, Result};
use crate::incidents::IncidentManager;
use crate::incidents::state::Severity;
use crate::monitoring::{ProbeRunner, ScheduledMonitor, SchedulerHandle};
use crate::validation::{validate_monitor_update, validate_new_monitor};

/// Result of an out-of-band check, in the shape the dashboard reads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckSummary {
    pub monitor_id: i64,
    pub is_up: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Operations the engine exposes to its collaborators
///
/// Cloning is cheap; every clone drives the same scheduler and storage.
#[derive(Clone)]
pub struct VigilService {
    database: Arc<dyn Database>,
    scheduler: SchedulerHandle,
    runner: Arc<ProbeRunner>,
    incidents: IncidentManager,
    aggregator: Aggregator,
    clock: Arc<dyn Clock>,
    default_severity: Severity,
}

impl VigilService {
    pub fn new(
        database: Arc<dyn Database>,
        scheduler: SchedulerHandle,
        runner: Arc<ProbeRunner>,
        incidents: IncidentManager,
        aggregator: Aggregator,
        clock: Arc<dyn Clock>,
        default_severity: Severity,
    ) -> Self {
        Self { database, scheduler, runner, incidents, aggregator, clock, default_severity }
    }

    pub async fn list_monitors(&self, project_id: Option<i64>) -> Result<Vec<Monitor>> {
        self.database.list_monitors(project_id).await
    }

    pub async fn get_monitor(&self, id: i64) -> Result<Monitor> {
        self.database
            .get_monitor(id)
            .await?
            .ok_or(Error::NotFound { entity: EntityKind::Monitor, id })
    }

    pub async fn create_monitor(&self, mut monitor: NewMonitor) -> Result<Monitor> {
        validate_new_monitor(&monitor)?;
        monitor.severity = monitor.severity.or(Some(self.default_severity));

        let created = self.database.insert_monitor(&monitor, self.clock.now()).await?;
        self.scheduler.schedule(ScheduledMonitor::from(&created));
        info!(monitor_id = created.id, target = %created.target, "Created monitor");
        Ok(created)
    }

    pub async fn update_monitor(&self, id: i64, update: MonitorUpdate) -> Result<Monitor> {
        validate_monitor_update(&update)?;

        let updated = self.database.update_monitor(id, &update, self.clock.now()).await?;
        self.scheduler.schedule(ScheduledMonitor::from(&updated));
        info!(monitor_id = id, "Updated monitor");
        Ok(updated)
    }

    /// Remove a monitor from the schedule and soft-delete it. Its incidents stay.
    pub async fn delete_monitor(&self, id: i64) -> Result<Monitor> {
        let deleted = self.database.delete_monitor(id, self.clock.now()).await?;
        self.scheduler.unschedule(id);
        info!(monitor_id = id, "Deleted monitor");
        Ok(deleted)
    }

    /// Probe a monitor now. The result flows through status tracking and can
    /// open or resolve incidents like a scheduled probe.
    pub async fn check_monitor(&self, id: i64) -> Result<CheckSummary> {
        let monitor = self.get_monitor(id).await?;
        let result = self.runner.check_now(&monitor).await?;

        Ok(CheckSummary {
            monitor_id: id,
            is_up: result.success,
            status_code: result.status_code,
            response_time_ms: result.latency_ms,
            error: result.error_message,
            checked_at: result.checked_at,
        })
    }

    pub async fn probe_history(&self, id: i64, limit: u32) -> Result<Vec<ProbeRecord>> {
        self.get_monitor(id).await?;
        self.database.probe_history(id, limit).await
    }

    pub async fn list_incidents(&self, filter: IncidentFilter) -> Result<Vec<Incident>> {
        self.incidents.list(filter).await
    }

    /// Open or acknowledged incidents only
    pub async fn list_active_incidents(&self, project_id: Option<i64>) -> Result<Vec<Incident>> {
        self.incidents
            .list(IncidentFilter { status: None, project_id, active_only: true })
            .await
    }

    pub async fn get_incident(&self, id: i64) -> Result<Incident> {
        self.incidents
            .get(id)
            .await?
            .ok_or(Error::NotFound { entity: EntityKind::Incident, id })
    }

    pub async fn create_incident(&self, incident: NewIncident) -> Result<Incident> {
        self.incidents.create(incident).await
    }

    pub async fn acknowledge_incident(&self, id: i64) -> Result<Incident> {
        self.incidents.acknowledge(id).await
    }

    pub async fn resolve_incident(&self, id: i64) -> Result<Incident> {
        self.incidents.resolve(id).await
    }

    pub async fn dashboard(
        &self,
        project_id: Option<i64>,
        window: Option<Duration>,
    ) -> Result<DashboardRollup> {
        self.aggregator.dashboard(project_id, window).await
    }

    pub async fn monitoring_rollup(
        &self,
        project_id: Option<i64>,
        window: Option<Duration>,
    ) -> Result<MonitoringRollup> {
        self.aggregator.monitoring(project_id, window).await
    }

    pub async fn audit_log(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>> {
        self.database.audit_log(filter).await
    }

    pub async fn audit_stats(&self, window: Option<Duration>) -> Result<ActivityRollup> {
        Ok(self.aggregator.dashboard(None, window).await?.activity)
    }

    pub async fn sla_report(
        &self,
        monitor_id: Option<i64>,
        window: Option<Duration>,
    ) -> Result<SlaReport> {
        self.aggregator.sla_report(monitor_id, window).await
    }

    pub async fn monitor_uptime(&self, id: i64, window: Option<Duration>) -> Result<UptimeReport> {
        self.aggregator.monitor_uptime(id, window).await
    }

    pub async fn response_times(
        &self,
        id: i64,
        window: Option<Duration>,
    ) -> Result<ResponseTimeReport> {
        self.aggregator.response_times(id, window).await
    }

    pub async fn mtta(&self, window: Option<Duration>) -> Result<MttaReport> {
        self.aggregator.mtta(window).await
    }

    pub async fn mttr(&self, window: Option<Duration>) -> Result<MttrReport> {
        self.aggregator.mttr(window).await
    }

    pub async fn health_score(&self) -> Result<HealthScore> {
        self.aggregator.health_score().await
    }
}
