use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use libsql::Row;
use serde::{Deserialize, Serialize};

use crate::clock::from_millis;
use crate::error::{Error, Result};
use crate::incidents::state::{IncidentSource, IncidentStatus, Lifecycle, Severity};
use crate::monitoring::types::{MonitorStatus, ProbeResult};

/// Kinds of entity that appear in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Monitor,
    Incident,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Monitor => "monitor",
            EntityKind::Incident => "incident",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "monitor" => Ok(EntityKind::Monitor),
            "incident" => Ok(EntityKind::Incident),
            other => Err(Error::validation(format!("unknown entity type '{other}'"))),
        }
    }
}

pub(crate) fn parse_column<T>(row: &Row, idx: i32) -> Result<T>
where
    T: FromStr<Err = Error>,
{
    let raw = row.get::<String>(idx)?;
    raw.parse()
        .map_err(|e: Error| Error::Corrupt(format!("column {idx} holds '{raw}': {e}")))
}

fn optional_time(row: &Row, idx: i32) -> Result<Option<DateTime<Utc>>> {
    Ok(row.get::<Option<i64>>(idx)?.map(from_millis))
}

/// Monitor model - a target that is periodically health-checked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: i64,
    pub project_id: Option<i64>,
    pub name: String,
    pub target: String,
    pub interval_seconds: u64,
    /// Severity given to incidents opened automatically for this monitor
    pub severity: Severity,
    pub last_status: MonitorStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Monitor {
    pub(crate) const COLUMNS: &'static str = "id, project_id, name, target, interval_seconds, severity, \
         last_status, last_check, created_at, updated_at, deleted_at";

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            target: row.get(3)?,
            interval_seconds: row.get::<i64>(4)?.max(1) as u64,
            severity: parse_column(row, 5)?,
            last_status: parse_column(row, 6)?,
            last_check: optional_time(row, 7)?,
            created_at: from_millis(row.get(8)?),
            updated_at: from_millis(row.get(9)?),
            deleted_at: optional_time(row, 10)?,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Fields an operator supplies when creating a monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMonitor {
    pub name: String,
    #[serde(alias = "url")]
    pub target: String,
    #[serde(default = "default_interval", alias = "check_interval")]
    pub interval_seconds: u64,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

fn default_interval() -> u64 {
    60
}

impl NewMonitor {
    pub fn new(name: impl Into<String>, target: impl Into<String>, interval_seconds: u64) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            interval_seconds,
            project_id: None,
            severity: None,
        }
    }

    pub fn in_project(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }
}

/// Partial edit of a monitor; `None` leaves the field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorUpdate {
    pub name: Option<String>,
    #[serde(alias = "url")]
    pub target: Option<String>,
    #[serde(alias = "check_interval")]
    pub interval_seconds: Option<u64>,
    pub severity: Option<Severity>,
}

/// A persisted probe outcome, as read back for history and rollups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub id: i64,
    pub monitor_id: i64,
    pub is_up: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProbeRecord {
    pub(crate) const COLUMNS: &'static str =
        "id, monitor_id, success, status_code, latency_ms, error_message, checked_at";

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            monitor_id: row.get(1)?,
            is_up: row.get::<i64>(2)? != 0,
            status_code: row.get::<Option<i64>>(3)?.map(|code| code as u16),
            response_time_ms: row.get::<i64>(4)?.max(0) as u64,
            error_message: row.get(5)?,
            timestamp: from_millis(row.get(6)?),
        })
    }

    pub fn from_probe(id: i64, result: &ProbeResult) -> Self {
        Self {
            id,
            monitor_id: result.monitor_id,
            is_up: result.success,
            status_code: result.status_code,
            response_time_ms: result.latency_ms,
            error_message: result.error_message.clone(),
            timestamp: result.checked_at,
        }
    }
}

/// Incident model - a tracked fault, automatic or manual
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub monitor_id: Option<i64>,
    pub project_id: Option<i64>,
    pub source: IncidentSource,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl Incident {
    pub(crate) const COLUMNS: &'static str = "id, monitor_id, project_id, source, title, description, \
         severity, status, started_at, acknowledged_at, resolved_at";

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            monitor_id: row.get(1)?,
            project_id: row.get(2)?,
            source: parse_column(row, 3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            severity: parse_column(row, 6)?,
            lifecycle: Lifecycle {
                status: parse_column(row, 7)?,
                started_at: from_millis(row.get(8)?),
                acknowledged_at: optional_time(row, 9)?,
                resolved_at: optional_time(row, 10)?,
            },
        })
    }

    pub fn status(&self) -> IncidentStatus {
        self.lifecycle.status
    }
}

/// Fields supplied when a person opens an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIncident {
    pub title: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub monitor_id: Option<i64>,
    #[serde(default)]
    pub project_id: Option<i64>,
}

impl NewIncident {
    pub fn new(title: impl Into<String>, severity: Severity) -> Self {
        Self { title: title.into(), severity, description: None, monitor_id: None, project_id: None }
    }

    pub fn for_monitor(mut self, monitor_id: i64) -> Self {
        self.monitor_id = Some(monitor_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Filters for listing incidents
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IncidentFilter {
    pub status: Option<IncidentStatus>,
    pub project_id: Option<i64>,
    /// Only open or acknowledged incidents
    #[serde(default)]
    pub active_only: bool,
}

/// One row of the append-only audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub entity_type: EntityKind,
    pub entity_id: i64,
    pub action: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub(crate) const COLUMNS: &'static str =
        "id, entity_type, entity_id, action, old_value, new_value, timestamp";

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        let decode = |raw: Option<String>| -> Result<Option<serde_json::Value>> {
            raw.map(|text| serde_json::from_str(&text)).transpose().map_err(Error::from)
        };

        Ok(Self {
            id: row.get(0)?,
            entity_type: row
                .get::<String>(1)?
                .parse()
                .map_err(|_| Error::Corrupt("unknown audit entity type".into()))?,
            entity_id: row.get(2)?,
            action: row.get(3)?,
            old_value: decode(row.get(4)?)?,
            new_value: decode(row.get(5)?)?,
            timestamp: from_millis(row.get(6)?),
        })
    }
}

/// Filters and paging for the audit log
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuditFilter {
    pub entity_type: Option<EntityKind>,
    pub entity_id: Option<i64>,
    #[serde(default = "default_audit_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_audit_limit() -> u32 {
    100
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self { entity_type: None, entity_id: None, limit: default_audit_limit(), offset: 0 }
    }
}

/// Board task row, owned by the board collaborators and only read here
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub column_id: Option<i64>,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

fn default_priority() -> String {
    "medium".to_string()
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            project_id: None,
            column_id: None,
            priority: default_priority(),
            completed: false,
            due_at: None,
        }
    }
}
