use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Last known verdict for a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    Unknown,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Unknown => "unknown",
        }
    }

    /// Verdict of a single probe: `up` iff it succeeded.
    pub fn from_success(success: bool) -> Self {
        if success { MonitorStatus::Up } else { MonitorStatus::Down }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(MonitorStatus::Up),
            "down" => Ok(MonitorStatus::Down),
            "unknown" => Ok(MonitorStatus::Unknown),
            other => Err(Error::Corrupt(format!("unknown monitor status '{other}'"))),
        }
    }
}

/// Outcome of one probe against a monitor's target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// Monitor that was probed
    pub monitor_id: i64,

    /// Whether the target answered with a 2xx in time
    pub success: bool,

    /// HTTP status code, absent when no response arrived
    pub status_code: Option<u16>,

    /// Wall-clock time from dispatch to response or timeout
    pub latency_ms: u64,

    /// Why the probe failed, if it did
    pub error_message: Option<String>,

    /// When the probe finished
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn success(monitor_id: i64, status_code: u16, latency_ms: u64, at: DateTime<Utc>) -> Self {
        Self {
            monitor_id,
            success: true,
            status_code: Some(status_code),
            latency_ms,
            error_message: None,
            checked_at: at,
        }
    }

    pub fn failure(
        monitor_id: i64,
        status_code: Option<u16>,
        latency_ms: u64,
        error: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            monitor_id,
            success: false,
            status_code,
            latency_ms,
            error_message: Some(error.into()),
            checked_at: at,
        }
    }

    pub fn verdict(&self) -> MonitorStatus {
        MonitorStatus::from_success(self.success)
    }
}

/// Direction of a verdict change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    WentDown,
    Recovered,
}

/// A change in a monitor's up/down verdict between consecutive probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub monitor_id: i64,
    pub kind: TransitionKind,
    pub at: DateTime<Utc>,
    /// Failure reason carried into automatic incident titles
    pub reason: Option<String>,
}

impl Transition {
    /// Derive the transition implied by moving from `previous` to `current`.
    ///
    /// A first `up` after `unknown` only sets the baseline. A first `down` is
    /// an outage like any other and opens an incident.
    pub fn between(previous: MonitorStatus, current: MonitorStatus) -> Option<TransitionKind> {
        match (previous, current) {
            (MonitorStatus::Up | MonitorStatus::Unknown, MonitorStatus::Down) => {
                Some(TransitionKind::WentDown)
            }
            (MonitorStatus::Down, MonitorStatus::Up) => Some(TransitionKind::Recovered),
            _ => None,
        }
    }
}
