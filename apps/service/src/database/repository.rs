use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Transaction, TransactionBehavior, params};
use serde::Serialize;
use tracing::{debug, warn};

use super::models::{
    AuditEntry, AuditFilter, EntityKind, Incident, IncidentFilter, Monitor, MonitorUpdate,
    NewIncident, NewMonitor, NewTask, ProbeRecord,
};
use crate::clock::{from_millis, to_millis};
use crate::dashboard::rollup::{
    AuditCounts, ColumnCount, DashboardSnapshot, MonitorWindow, TaskCounts,
};
use crate::dashboard::sla::{IncidentTimes, MonitorSample, SlaSnapshot};
use crate::error::{Error, Result};
use crate::incidents::state::{IncidentAction, IncidentSource, Lifecycle};
use crate::incidents::automatic_title;
use crate::monitoring::types::{MonitorStatus, ProbeResult};
use crate::pool::{LibsqlManager, LibsqlPool};

/// What recording a probe did to its monitor
#[derive(Debug, Clone)]
pub struct ProbeApplied {
    /// Monitor state after the probe was applied
    pub monitor: Monitor,
    /// Status stored before this probe
    pub previous: MonitorStatus,
    pub record: ProbeRecord,
}

/// Database trait for abstracting database operations
///
/// Every mutating method commits its change together with exactly one
/// audit row, except probe recording which audits only real status changes.
#[async_trait]
pub trait Database: Send + Sync {
    /// Live (not deleted) monitors, optionally limited to a project
    async fn list_monitors(&self, project_id: Option<i64>) -> Result<Vec<Monitor>>;

    /// Get a live monitor by id
    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>>;

    async fn insert_monitor(&self, monitor: &NewMonitor, now: DateTime<Utc>) -> Result<Monitor>;

    async fn update_monitor(
        &self,
        id: i64,
        update: &MonitorUpdate,
        now: DateTime<Utc>,
    ) -> Result<Monitor>;

    /// Soft-delete a monitor, returning its last live state
    async fn delete_monitor(&self, id: i64, now: DateTime<Utc>) -> Result<Monitor>;

    /// Store a probe outcome and fold its verdict into the monitor's status
    async fn apply_probe_result(&self, result: &ProbeResult) -> Result<ProbeApplied>;

    /// Most recent probe outcomes for a monitor, newest first
    async fn probe_history(&self, monitor_id: i64, limit: u32) -> Result<Vec<ProbeRecord>>;

    async fn list_incidents(&self, filter: IncidentFilter) -> Result<Vec<Incident>>;

    async fn get_incident(&self, id: i64) -> Result<Option<Incident>>;

    async fn insert_manual_incident(
        &self,
        incident: &NewIncident,
        now: DateTime<Utc>,
    ) -> Result<Incident>;

    /// Open an automatic incident unless the monitor already has an active one
    async fn open_automatic_incident(
        &self,
        monitor_id: i64,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Incident>>;

    /// Apply a lifecycle action to an incident
    async fn transition_incident(
        &self,
        id: i64,
        action: IncidentAction,
        now: DateTime<Utc>,
    ) -> Result<Incident>;

    /// Resolve the incident a recovering monitor is responsible for, if any
    async fn resolve_active_for_monitor(
        &self,
        monitor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Incident>>;

    async fn audit_log(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>>;

    /// Read every count the dashboard needs from one consistent snapshot
    async fn dashboard_snapshot(
        &self,
        project_id: Option<i64>,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DashboardSnapshot>;

    /// Read probe and incident history for SLA reporting from one snapshot.
    ///
    /// With `monitor_id` set only that live monitor is sampled; incidents are
    /// always taken across every monitor.
    async fn sla_snapshot(
        &self,
        monitor_id: Option<i64>,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SlaSnapshot>;

    /// Board collaborators' write path for tasks
    async fn insert_task(&self, task: &NewTask, now: DateTime<Utc>) -> Result<i64>;

    async fn insert_board_column(
        &self,
        name: &str,
        project_id: Option<i64>,
        position: i64,
    ) -> Result<i64>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    /// Writers take the database lock up front so check-then-write is atomic.
    async fn begin_write(conn: &Connection) -> Result<Transaction> {
        Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate).await?)
    }

    async fn finish<T>(tx: Transaction, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!("Rollback after failed write also failed: {}", rollback);
                }
                Err(e)
            }
        }
    }
}

fn snapshot<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

async fn append_audit(
    conn: &Connection,
    entity_type: EntityKind,
    entity_id: i64,
    action: &str,
    old_value: Option<serde_json::Value>,
    new_value: Option<serde_json::Value>,
    at: DateTime<Utc>,
) -> Result<()> {
    let old_value = old_value.map(|v| v.to_string());
    let new_value = new_value.map(|v| v.to_string());

    conn.execute(
        "INSERT INTO audit_log (entity_type, entity_id, action, old_value, new_value, timestamp) \
         VALUES (?, ?, ?, ?, ?, ?)",
        params![entity_type.as_str(), entity_id, action, old_value, new_value, to_millis(at)],
    )
    .await?;
    Ok(())
}

async fn fetch_monitor(conn: &Connection, id: i64, include_deleted: bool) -> Result<Option<Monitor>> {
    let sql = format!(
        "SELECT {} FROM monitors WHERE id = ?1 AND (?2 = 1 OR deleted_at IS NULL)",
        Monitor::COLUMNS
    );
    let mut rows = conn.query(&sql, params![id, include_deleted as i64]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(Monitor::from_row(&row)?)),
        None => Ok(None),
    }
}

async fn require_monitor(conn: &Connection, id: i64) -> Result<Monitor> {
    fetch_monitor(conn, id, false)
        .await?
        .ok_or(Error::NotFound { entity: EntityKind::Monitor, id })
}

async fn fetch_incident(conn: &Connection, id: i64) -> Result<Option<Incident>> {
    let sql = format!("SELECT {} FROM incidents WHERE id = ?1", Incident::COLUMNS);
    let mut rows = conn.query(&sql, params![id]).await?;
    match rows.next().await? {
        Some(row) => Ok(Some(Incident::from_row(&row)?)),
        None => Ok(None),
    }
}

/// Write `next` over `incident`, guarded on the status it was read with.
async fn store_transition(
    conn: &Connection,
    incident: &Incident,
    action: IncidentAction,
    next: Lifecycle,
    now: DateTime<Utc>,
) -> Result<Incident> {
    let changed = conn
        .execute(
            "UPDATE incidents SET status = ?1, acknowledged_at = ?2, resolved_at = ?3 \
             WHERE id = ?4 AND status = ?5",
            params![
                next.status.as_str(),
                next.acknowledged_at.map(to_millis),
                next.resolved_at.map(to_millis),
                incident.id,
                incident.status().as_str()
            ],
        )
        .await?;

    if changed == 0 {
        return Err(Error::InvalidTransition { id: incident.id, from: incident.status(), action });
    }

    let mut updated = incident.clone();
    updated.lifecycle = next;

    append_audit(
        conn,
        EntityKind::Incident,
        incident.id,
        action.as_str(),
        Some(snapshot(incident)?),
        Some(snapshot(&updated)?),
        now,
    )
    .await?;

    Ok(updated)
}

async fn count(conn: &Connection, sql: &str, params: impl libsql::params::IntoParams) -> Result<u64> {
    let mut rows = conn.query(sql, params).await?;
    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)?.max(0) as u64),
        None => Ok(0),
    }
}

async fn grouped_counts(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<Vec<(String, u64)>> {
    let mut rows = conn.query(sql, params).await?;
    let mut counts = Vec::new();
    while let Some(row) = rows.next().await? {
        counts.push((row.get::<String>(0)?, row.get::<i64>(1)?.max(0) as u64));
    }
    Ok(counts)
}

async fn read_snapshot(
    conn: &Connection,
    project_id: Option<i64>,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<DashboardSnapshot> {
    let start = to_millis(window_start);
    let end = to_millis(now);

    let mut rows = conn
        .query(
            "SELECT COUNT(*), COALESCE(SUM(completed), 0), \
                    COALESCE(SUM(CASE WHEN completed = 0 AND due_at IS NOT NULL AND due_at < ?2 \
                                 THEN 1 ELSE 0 END), 0) \
             FROM tasks WHERE (?1 IS NULL OR project_id = ?1)",
            params![project_id, end],
        )
        .await?;
    let (total, completed, overdue) = match rows.next().await? {
        Some(row) => (row.get::<i64>(0)?, row.get::<i64>(1)?, row.get::<i64>(2)?),
        None => (0, 0, 0),
    };

    let pending_by_priority = grouped_counts(
        conn,
        "SELECT priority, COUNT(*) FROM tasks \
         WHERE completed = 0 AND (?1 IS NULL OR project_id = ?1) \
         GROUP BY priority ORDER BY priority",
        params![project_id],
    )
    .await?;

    let by_column = grouped_counts(
        conn,
        "SELECT c.name, COUNT(t.id) FROM board_columns c \
         LEFT JOIN tasks t ON t.column_id = c.id \
         WHERE (?1 IS NULL OR c.project_id = ?1) \
         GROUP BY c.id, c.name ORDER BY c.position, c.id",
        params![project_id],
    )
    .await?
    .into_iter()
    .map(|(name, count)| ColumnCount { name, count })
    .collect();

    let monitors_by_status = grouped_counts(
        conn,
        "SELECT last_status, COUNT(*) FROM monitors \
         WHERE deleted_at IS NULL AND (?1 IS NULL OR project_id = ?1) \
         GROUP BY last_status",
        params![project_id],
    )
    .await?
    .into_iter()
    .collect();

    let active_incidents = count(
        conn,
        "SELECT COUNT(*) FROM incidents \
         WHERE status != 'resolved' AND (?1 IS NULL OR project_id = ?1)",
        params![project_id],
    )
    .await?;

    let mut rows = conn
        .query(
            "SELECT p.monitor_id, COALESCE(SUM(p.success), 0), COUNT(*), COALESCE(SUM(p.latency_ms), 0) \
             FROM probe_results p JOIN monitors m ON m.id = p.monitor_id \
             WHERE p.checked_at > ?2 AND p.checked_at <= ?3 \
               AND m.deleted_at IS NULL AND (?1 IS NULL OR m.project_id = ?1) \
             GROUP BY p.monitor_id ORDER BY p.monitor_id",
            params![project_id, start, end],
        )
        .await?;
    let mut probe_windows = Vec::new();
    while let Some(row) = rows.next().await? {
        probe_windows.push(MonitorWindow {
            monitor_id: row.get(0)?,
            up: row.get::<i64>(1)?.max(0) as u64,
            total: row.get::<i64>(2)?.max(0) as u64,
            latency_sum_ms: row.get::<i64>(3)?.max(0) as u64,
        });
    }

    let audit = AuditCounts {
        total: count(conn, "SELECT COUNT(*) FROM audit_log", ()).await?,
        in_window: count(
            conn,
            "SELECT COUNT(*) FROM audit_log WHERE timestamp > ?1 AND timestamp <= ?2",
            params![start, end],
        )
        .await?,
        by_action: grouped_counts(
            conn,
            "SELECT action, COUNT(*) FROM audit_log GROUP BY action",
            (),
        )
        .await?
        .into_iter()
        .collect(),
        by_entity: grouped_counts(
            conn,
            "SELECT entity_type, COUNT(*) FROM audit_log GROUP BY entity_type",
            (),
        )
        .await?
        .into_iter()
        .collect(),
    };

    Ok(DashboardSnapshot {
        taken_at: now,
        window_start,
        tasks: TaskCounts {
            total: total.max(0) as u64,
            completed: completed.max(0) as u64,
            overdue: overdue.max(0) as u64,
            pending_by_priority: pending_by_priority.into_iter().collect(),
            by_column,
        },
        monitors_by_status,
        active_incidents,
        probe_windows,
        audit,
    })
}

async fn read_sla_snapshot(
    conn: &Connection,
    monitor_id: Option<i64>,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<SlaSnapshot> {
    let start = to_millis(window_start);
    let end = to_millis(now);

    let mut monitors = Vec::new();
    let mut rows = conn
        .query(
            "SELECT id, name FROM monitors \
             WHERE deleted_at IS NULL AND (?1 IS NULL OR id = ?1) ORDER BY name, id",
            params![monitor_id],
        )
        .await?;
    while let Some(row) = rows.next().await? {
        monitors.push(MonitorSample {
            monitor_id: row.get(0)?,
            name: row.get(1)?,
            total: 0,
            up: 0,
            latencies_ms: Vec::new(),
        });
    }

    let mut rows = conn
        .query(
            "SELECT monitor_id, COUNT(*), COALESCE(SUM(success), 0) FROM probe_results \
             WHERE checked_at > ?1 AND checked_at <= ?2 AND (?3 IS NULL OR monitor_id = ?3) \
             GROUP BY monitor_id",
            params![start, end, monitor_id],
        )
        .await?;
    while let Some(row) = rows.next().await? {
        let id: i64 = row.get(0)?;
        if let Some(sample) = monitors.iter_mut().find(|m| m.monitor_id == id) {
            sample.total = row.get::<i64>(1)?.max(0) as u64;
            sample.up = row.get::<i64>(2)?.max(0) as u64;
        }
    }

    let mut rows = conn
        .query(
            "SELECT monitor_id, latency_ms FROM probe_results \
             WHERE success = 1 AND checked_at > ?1 AND checked_at <= ?2 \
               AND (?3 IS NULL OR monitor_id = ?3) \
             ORDER BY monitor_id, latency_ms",
            params![start, end, monitor_id],
        )
        .await?;
    while let Some(row) = rows.next().await? {
        let id: i64 = row.get(0)?;
        if let Some(sample) = monitors.iter_mut().find(|m| m.monitor_id == id) {
            sample.latencies_ms.push(row.get::<i64>(1)?.max(0) as u64);
        }
    }

    let mut incidents = Vec::new();
    let mut rows = conn
        .query(
            "SELECT started_at, acknowledged_at, resolved_at FROM incidents \
             WHERE started_at > ?1 AND started_at <= ?2 ORDER BY started_at, id",
            params![start, end],
        )
        .await?;
    while let Some(row) = rows.next().await? {
        incidents.push(IncidentTimes {
            started_at: from_millis(row.get(0)?),
            acknowledged_at: row.get::<Option<i64>>(1)?.map(from_millis),
            resolved_at: row.get::<Option<i64>>(2)?.map(from_millis),
        });
    }

    Ok(SlaSnapshot { taken_at: now, window_start, monitors, incidents })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn list_monitors(&self, project_id: Option<i64>) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM monitors \
             WHERE deleted_at IS NULL AND (?1 IS NULL OR project_id = ?1) \
             ORDER BY name, id",
            Monitor::COLUMNS
        );

        let mut rows = conn.query(&sql, params![project_id]).await?;
        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(Monitor::from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        fetch_monitor(&conn, id, false).await
    }

    async fn insert_monitor(&self, monitor: &NewMonitor, now: DateTime<Utc>) -> Result<Monitor> {
        let conn = self.get_conn().await?;
        let tx = Self::begin_write(&conn).await?;

        let outcome: Result<Monitor> = async {
            tx.execute(
                "INSERT INTO monitors (project_id, name, target, interval_seconds, severity, \
                 last_status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, 'unknown', ?, ?)",
                params![
                    monitor.project_id,
                    monitor.name.clone(),
                    monitor.target.clone(),
                    monitor.interval_seconds as i64,
                    monitor.severity.unwrap_or_default().as_str(),
                    to_millis(now),
                    to_millis(now)
                ],
            )
            .await?;

            let id = tx.last_insert_rowid();
            let created = require_monitor(&tx, id).await?;
            append_audit(&tx, EntityKind::Monitor, id, "create", None, Some(snapshot(&created)?), now)
                .await?;
            Ok(created)
        }
        .await;

        Self::finish(tx, outcome).await
    }

    async fn update_monitor(
        &self,
        id: i64,
        update: &MonitorUpdate,
        now: DateTime<Utc>,
    ) -> Result<Monitor> {
        let conn = self.get_conn().await?;
        let tx = Self::begin_write(&conn).await?;

        let outcome: Result<Monitor> = async {
            let before = require_monitor(&tx, id).await?;

            tx.execute(
                "UPDATE monitors SET name = ?1, target = ?2, interval_seconds = ?3, severity = ?4, \
                 updated_at = ?5 WHERE id = ?6",
                params![
                    update.name.clone().unwrap_or_else(|| before.name.clone()),
                    update.target.clone().unwrap_or_else(|| before.target.clone()),
                    update.interval_seconds.unwrap_or(before.interval_seconds) as i64,
                    update.severity.unwrap_or(before.severity).as_str(),
                    to_millis(now),
                    id
                ],
            )
            .await?;

            let after = require_monitor(&tx, id).await?;
            append_audit(
                &tx,
                EntityKind::Monitor,
                id,
                "update",
                Some(snapshot(&before)?),
                Some(snapshot(&after)?),
                now,
            )
            .await?;
            Ok(after)
        }
        .await;

        Self::finish(tx, outcome).await
    }

    async fn delete_monitor(&self, id: i64, now: DateTime<Utc>) -> Result<Monitor> {
        let conn = self.get_conn().await?;
        let tx = Self::begin_write(&conn).await?;

        let outcome: Result<Monitor> = async {
            let before = require_monitor(&tx, id).await?;

            tx.execute(
                "UPDATE monitors SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
                params![to_millis(now), id],
            )
            .await?;

            append_audit(&tx, EntityKind::Monitor, id, "delete", Some(snapshot(&before)?), None, now)
                .await?;
            Ok(before)
        }
        .await;

        Self::finish(tx, outcome).await
    }

    async fn apply_probe_result(&self, result: &ProbeResult) -> Result<ProbeApplied> {
        let conn = self.get_conn().await?;
        let tx = Self::begin_write(&conn).await?;

        let outcome: Result<ProbeApplied> = async {
            // Deleted monitors still take the result of a probe that was already in flight.
            let before = fetch_monitor(&tx, result.monitor_id, true)
                .await?
                .ok_or(Error::NotFound { entity: EntityKind::Monitor, id: result.monitor_id })?;

            tx.execute(
                "INSERT INTO probe_results (monitor_id, success, status_code, latency_ms, \
                 error_message, checked_at) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    result.monitor_id,
                    result.success as i64,
                    result.status_code.map(|code| code as i64),
                    result.latency_ms as i64,
                    result.error_message.clone(),
                    to_millis(result.checked_at)
                ],
            )
            .await?;
            let record = ProbeRecord::from_probe(tx.last_insert_rowid(), result);

            let current = result.verdict();
            tx.execute(
                "UPDATE monitors SET last_status = ?1, last_check = ?2 WHERE id = ?3",
                params![current.as_str(), to_millis(result.checked_at), result.monitor_id],
            )
            .await?;

            if current != before.last_status {
                append_audit(
                    &tx,
                    EntityKind::Monitor,
                    before.id,
                    "status_change",
                    Some(serde_json::json!({ "last_status": before.last_status })),
                    Some(serde_json::json!({ "last_status": current })),
                    result.checked_at,
                )
                .await?;
            }

            let mut monitor = before.clone();
            monitor.last_status = current;
            monitor.last_check = Some(result.checked_at);

            Ok(ProbeApplied { monitor, previous: before.last_status, record })
        }
        .await;

        Self::finish(tx, outcome).await
    }

    async fn probe_history(&self, monitor_id: i64, limit: u32) -> Result<Vec<ProbeRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM probe_results WHERE monitor_id = ?1 \
             ORDER BY checked_at DESC, id DESC LIMIT ?2",
            ProbeRecord::COLUMNS
        );

        let mut rows = conn.query(&sql, params![monitor_id, limit as i64]).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(ProbeRecord::from_row(&row)?);
        }
        Ok(records)
    }

    async fn list_incidents(&self, filter: IncidentFilter) -> Result<Vec<Incident>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM incidents \
             WHERE (?1 IS NULL OR status = ?1) \
               AND (?2 IS NULL OR project_id = ?2) \
               AND (?3 = 0 OR status != 'resolved') \
             ORDER BY started_at DESC, id DESC",
            Incident::COLUMNS
        );

        let status = filter.status.map(|s| s.as_str().to_string());
        let mut rows = conn
            .query(&sql, params![status, filter.project_id, filter.active_only as i64])
            .await?;
        let mut incidents = Vec::new();
        while let Some(row) = rows.next().await? {
            incidents.push(Incident::from_row(&row)?);
        }
        Ok(incidents)
    }

    async fn get_incident(&self, id: i64) -> Result<Option<Incident>> {
        let conn = self.get_conn().await?;
        fetch_incident(&conn, id).await
    }

    async fn insert_manual_incident(
        &self,
        incident: &NewIncident,
        now: DateTime<Utc>,
    ) -> Result<Incident> {
        let conn = self.get_conn().await?;
        let tx = Self::begin_write(&conn).await?;

        let outcome: Result<Incident> = async {
            let project_id = match incident.monitor_id {
                Some(monitor_id) => {
                    let monitor = require_monitor(&tx, monitor_id).await?;
                    incident.project_id.or(monitor.project_id)
                }
                None => incident.project_id,
            };

            tx.execute(
                "INSERT INTO incidents (monitor_id, project_id, source, title, description, \
                 severity, status, started_at) VALUES (?, ?, ?, ?, ?, ?, 'open', ?)",
                params![
                    incident.monitor_id,
                    project_id,
                    IncidentSource::Manual.as_str(),
                    incident.title.clone(),
                    incident.description.clone(),
                    incident.severity.as_str(),
                    to_millis(now)
                ],
            )
            .await?;

            let id = tx.last_insert_rowid();
            let created = fetch_incident(&tx, id)
                .await?
                .ok_or(Error::NotFound { entity: EntityKind::Incident, id })?;
            append_audit(&tx, EntityKind::Incident, id, "create", None, Some(snapshot(&created)?), now)
                .await?;
            Ok(created)
        }
        .await;

        Self::finish(tx, outcome).await
    }

    async fn open_automatic_incident(
        &self,
        monitor_id: i64,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Incident>> {
        let conn = self.get_conn().await?;
        let tx = Self::begin_write(&conn).await?;

        let outcome: Result<Option<Incident>> = async {
            let monitor = fetch_monitor(&tx, monitor_id, true)
                .await?
                .ok_or(Error::NotFound { entity: EntityKind::Monitor, id: monitor_id })?;

            let active = count(
                &tx,
                "SELECT COUNT(*) FROM incidents \
                 WHERE monitor_id = ?1 AND status != 'resolved'",
                params![monitor_id],
            )
            .await?;
            if active > 0 {
                debug!(monitor_id, "Monitor already has an active incident, not opening another");
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO incidents (monitor_id, project_id, source, title, description, \
                 severity, status, started_at) VALUES (?, ?, ?, ?, NULL, ?, 'open', ?)",
                params![
                    monitor_id,
                    monitor.project_id,
                    IncidentSource::Automatic.as_str(),
                    automatic_title(&monitor.name, reason),
                    monitor.severity.as_str(),
                    to_millis(now)
                ],
            )
            .await?;

            let id = tx.last_insert_rowid();
            let created = fetch_incident(&tx, id)
                .await?
                .ok_or(Error::NotFound { entity: EntityKind::Incident, id })?;
            append_audit(&tx, EntityKind::Incident, id, "create", None, Some(snapshot(&created)?), now)
                .await?;
            Ok(Some(created))
        }
        .await;

        Self::finish(tx, outcome).await
    }

    async fn transition_incident(
        &self,
        id: i64,
        action: IncidentAction,
        now: DateTime<Utc>,
    ) -> Result<Incident> {
        let conn = self.get_conn().await?;
        let tx = Self::begin_write(&conn).await?;

        let outcome: Result<Incident> = async {
            let incident = fetch_incident(&tx, id)
                .await?
                .ok_or(Error::NotFound { entity: EntityKind::Incident, id })?;
            let next = incident.lifecycle.transition(id, action, now)?;
            store_transition(&tx, &incident, action, next, now).await
        }
        .await;

        Self::finish(tx, outcome).await
    }

    async fn resolve_active_for_monitor(
        &self,
        monitor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Incident>> {
        let conn = self.get_conn().await?;
        let tx = Self::begin_write(&conn).await?;

        let outcome: Result<Option<Incident>> = async {
            // The automatic incident wins over manual ones filed against the same monitor.
            let sql = format!(
                "SELECT {} FROM incidents WHERE monitor_id = ?1 AND status != 'resolved' \
                 ORDER BY source = 'automatic' DESC, started_at DESC, id DESC LIMIT 1",
                Incident::COLUMNS
            );
            let mut rows = tx.query(&sql, params![monitor_id]).await?;
            let incident = match rows.next().await? {
                Some(row) => Incident::from_row(&row)?,
                None => return Ok(None),
            };

            let next = incident.lifecycle.transition(incident.id, IncidentAction::Resolve, now)?;
            store_transition(&tx, &incident, IncidentAction::Resolve, next, now).await.map(Some)
        }
        .await;

        Self::finish(tx, outcome).await
    }

    async fn audit_log(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM audit_log \
             WHERE (?1 IS NULL OR entity_type = ?1) AND (?2 IS NULL OR entity_id = ?2) \
             ORDER BY timestamp DESC, id DESC LIMIT ?3 OFFSET ?4",
            AuditEntry::COLUMNS
        );

        let entity_type = filter.entity_type.map(|kind| kind.as_str().to_string());
        let mut rows = conn
            .query(
                &sql,
                params![entity_type, filter.entity_id, filter.limit as i64, filter.offset as i64],
            )
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(AuditEntry::from_row(&row)?);
        }
        Ok(entries)
    }

    async fn dashboard_snapshot(
        &self,
        project_id: Option<i64>,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DashboardSnapshot> {
        let conn = self.get_conn().await?;
        // A deferred transaction pins one WAL snapshot for every query below.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred).await?;
        let outcome = read_snapshot(&tx, project_id, window_start, now).await;
        Self::finish(tx, outcome).await
    }

    async fn sla_snapshot(
        &self,
        monitor_id: Option<i64>,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SlaSnapshot> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred).await?;
        let outcome = read_sla_snapshot(&tx, monitor_id, window_start, now).await;
        Self::finish(tx, outcome).await
    }

    async fn insert_task(&self, task: &NewTask, now: DateTime<Utc>) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO tasks (project_id, column_id, title, priority, completed, due_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                task.project_id,
                task.column_id,
                task.title.clone(),
                task.priority.clone(),
                task.completed as i64,
                task.due_at.map(to_millis),
                to_millis(now)
            ],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    async fn insert_board_column(
        &self,
        name: &str,
        project_id: Option<i64>,
        position: i64,
    ) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO board_columns (project_id, name, position) VALUES (?, ?, ?)",
            params![project_id, name, position],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }
}
