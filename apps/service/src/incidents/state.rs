//! Incident lifecycle: `open → acknowledged → resolved`.
//!
//! Every transition is checked exhaustively; a disallowed one is an
//! [`Error::InvalidTransition`], never a silent success.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::Resolved => "resolved",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, IncidentStatus::Resolved)
    }

    /// Status reached by applying `action`, if the action is allowed from here.
    pub fn apply(self, action: IncidentAction) -> Option<IncidentStatus> {
        match (self, action) {
            (IncidentStatus::Open, IncidentAction::Acknowledge) => Some(IncidentStatus::Acknowledged),
            (IncidentStatus::Open | IncidentStatus::Acknowledged, IncidentAction::Resolve) => {
                Some(IncidentStatus::Resolved)
            }
            (IncidentStatus::Acknowledged | IncidentStatus::Resolved, IncidentAction::Acknowledge)
            | (IncidentStatus::Resolved, IncidentAction::Resolve) => None,
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(IncidentStatus::Open),
            "acknowledged" => Ok(IncidentStatus::Acknowledged),
            "resolved" => Ok(IncidentStatus::Resolved),
            other => Err(Error::Corrupt(format!("unknown incident status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentAction {
    Acknowledge,
    Resolve,
}

impl IncidentAction {
    /// Audit log action name
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentAction::Acknowledge => "acknowledge",
            IncidentAction::Resolve => "resolve",
        }
    }
}

impl fmt::Display for IncidentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered severity: `low < medium < high < critical`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    #[default]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(Error::validation(format!("unknown severity '{other}'"))),
        }
    }
}

/// Whether the incident was opened by a failing probe or by a person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSource {
    Automatic,
    Manual,
}

impl IncidentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentSource::Automatic => "automatic",
            IncidentSource::Manual => "manual",
        }
    }
}

impl FromStr for IncidentSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "automatic" => Ok(IncidentSource::Automatic),
            "manual" => Ok(IncidentSource::Manual),
            other => Err(Error::Corrupt(format!("unknown incident source '{other}'"))),
        }
    }
}

/// Timestamps that move with the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub status: IncidentStatus,
    pub started_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Lifecycle {
    pub fn opened(at: DateTime<Utc>) -> Self {
        Self { status: IncidentStatus::Open, started_at: at, acknowledged_at: None, resolved_at: None }
    }

    /// Apply `action` at `now`, keeping `started_at <= acknowledged_at <= resolved_at`.
    ///
    /// `now` is clamped forward to the latest existing timestamp so a clock
    /// step backwards cannot break the ordering.
    pub fn transition(&self, id: i64, action: IncidentAction, now: DateTime<Utc>) -> Result<Self> {
        let next = self
            .status
            .apply(action)
            .ok_or(Error::InvalidTransition { id, from: self.status, action })?;

        let floor = self.acknowledged_at.unwrap_or(self.started_at).max(self.started_at);
        let at = now.max(floor);

        let mut lifecycle = *self;
        lifecycle.status = next;
        match action {
            IncidentAction::Acknowledge => lifecycle.acknowledged_at = Some(at),
            IncidentAction::Resolve => lifecycle.resolved_at = Some(at),
        }
        Ok(lifecycle)
    }

    pub fn is_ordered(&self) -> bool {
        let ack_ok = self.acknowledged_at.is_none_or(|ack| self.started_at <= ack);
        let res_ok = self
            .resolved_at
            .is_none_or(|res| self.acknowledged_at.unwrap_or(self.started_at) <= res);
        ack_ok && res_ok
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::clock::from_millis;

    fn t0() -> DateTime<Utc> {
        from_millis(1_700_000_000_000)
    }

    #[test]
    fn test_acknowledge_then_resolve() {
        let opened = Lifecycle::opened(t0());
        let acked = opened.transition(1, IncidentAction::Acknowledge, t0() + Duration::seconds(5)).unwrap();
        assert_eq!(acked.status, IncidentStatus::Acknowledged);
        assert_eq!(acked.acknowledged_at, Some(t0() + Duration::seconds(5)));

        let resolved = acked.transition(1, IncidentAction::Resolve, t0() + Duration::seconds(9)).unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
        assert_eq!(resolved.acknowledged_at, acked.acknowledged_at);
        assert_eq!(resolved.resolved_at, Some(t0() + Duration::seconds(9)));
        assert!(resolved.is_ordered());
    }

    #[test]
    fn test_resolve_directly_from_open() {
        let resolved = Lifecycle::opened(t0()).transition(3, IncidentAction::Resolve, t0()).unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
        assert!(resolved.acknowledged_at.is_none());
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let acked = Lifecycle::opened(t0()).transition(7, IncidentAction::Acknowledge, t0()).unwrap();
        assert!(matches!(
            acked.transition(7, IncidentAction::Acknowledge, t0()),
            Err(Error::InvalidTransition { id: 7, from: IncidentStatus::Acknowledged, .. })
        ));

        let resolved = acked.transition(7, IncidentAction::Resolve, t0()).unwrap();
        assert!(matches!(
            resolved.transition(7, IncidentAction::Resolve, t0()),
            Err(Error::InvalidTransition { from: IncidentStatus::Resolved, action: IncidentAction::Resolve, .. })
        ));
        assert!(matches!(
            resolved.transition(7, IncidentAction::Acknowledge, t0()),
            Err(Error::InvalidTransition { from: IncidentStatus::Resolved, .. })
        ));
    }

    #[test]
    fn test_clock_skew_keeps_ordering() {
        let opened = Lifecycle::opened(t0());
        let acked = opened.transition(1, IncidentAction::Acknowledge, t0() - Duration::seconds(30)).unwrap();
        assert_eq!(acked.acknowledged_at, Some(t0()));
        assert!(acked.is_ordered());
    }

    #[test]
    fn test_severity_is_ordered() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
        assert!("warning".parse::<Severity>().is_err());
    }
}
