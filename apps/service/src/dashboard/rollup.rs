use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw counts read from one storage snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub taken_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub tasks: TaskCounts,
    /// Live monitors keyed by stored status
    pub monitors_by_status: BTreeMap<String, u64>,
    /// Incidents whose status is not `resolved`
    pub active_incidents: u64,
    /// Per-monitor probe totals inside the window
    pub probe_windows: Vec<MonitorWindow>,
    pub audit: AuditCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: u64,
    pub completed: u64,
    pub overdue: u64,
    pub pending_by_priority: BTreeMap<String, u64>,
    pub by_column: Vec<ColumnCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorWindow {
    pub monitor_id: i64,
    pub up: u64,
    pub total: u64,
    pub latency_sum_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditCounts {
    pub total: u64,
    pub in_window: u64,
    pub by_action: BTreeMap<String, u64>,
    pub by_entity: BTreeMap<String, u64>,
}

/// Dashboard rollup as served to the dashboard consumer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardRollup {
    pub generated_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub tasks: TaskRollup,
    pub monitoring: MonitoringRollup,
    pub activity: ActivityRollup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRollup {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
    pub overdue: u64,
    /// completed / total, 0 when there are no tasks
    pub completion_rate: f64,
    pub by_priority: BTreeMap<String, u64>,
    pub by_column: Vec<ColumnCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringRollup {
    pub total_monitors: u64,
    pub by_status: BTreeMap<String, u64>,
    pub open_incidents: u64,
    /// Percentage, averaged over monitors probed inside the window
    pub uptime_24h: f64,
    pub avg_response_time_ms: u64,
    pub monitors_observed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRollup {
    pub total_actions: u64,
    pub recent_24h: u64,
    pub by_action: BTreeMap<String, u64>,
    pub by_entity: BTreeMap<String, u64>,
}

impl DashboardRollup {
    pub fn from_snapshot(snapshot: &DashboardSnapshot) -> Self {
        Self {
            generated_at: snapshot.taken_at,
            window_start: snapshot.window_start,
            tasks: TaskRollup::from_counts(&snapshot.tasks),
            monitoring: MonitoringRollup::from_snapshot(snapshot),
            activity: ActivityRollup::from_counts(&snapshot.audit),
        }
    }
}

impl TaskRollup {
    pub fn from_counts(counts: &TaskCounts) -> Self {
        let completed = counts.completed.min(counts.total);
        Self {
            total: counts.total,
            completed,
            pending: counts.total - completed,
            overdue: counts.overdue,
            completion_rate: completion_rate(completed, counts.total),
            by_priority: counts.pending_by_priority.clone(),
            by_column: counts.by_column.clone(),
        }
    }
}

impl MonitoringRollup {
    pub fn from_snapshot(snapshot: &DashboardSnapshot) -> Self {
        Self {
            total_monitors: snapshot.monitors_by_status.values().sum(),
            by_status: snapshot.monitors_by_status.clone(),
            open_incidents: snapshot.active_incidents,
            uptime_24h: uptime_percentage(&snapshot.probe_windows),
            avg_response_time_ms: average_latency_ms(&snapshot.probe_windows),
            monitors_observed: snapshot.probe_windows.iter().filter(|w| w.total > 0).count() as u64,
        }
    }
}

impl ActivityRollup {
    pub fn from_counts(counts: &AuditCounts) -> Self {
        Self {
            total_actions: counts.total,
            recent_24h: counts.in_window.min(counts.total),
            by_action: counts.by_action.clone(),
            by_entity: counts.by_entity.clone(),
        }
    }
}

/// Fraction of tasks completed, always within `[0, 1]`.
pub fn completion_rate(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed.min(total) as f64 / total as f64
}

/// Mean of each observed monitor's up ratio, as a percentage rounded to two
/// decimals. Monitors without probes in the window are left out; with none
/// observed at all the result is 100.
pub fn uptime_percentage(windows: &[MonitorWindow]) -> f64 {
    let ratios: Vec<f64> = windows
        .iter()
        .filter(|w| w.total > 0)
        .map(|w| w.up.min(w.total) as f64 / w.total as f64)
        .collect();

    if ratios.is_empty() {
        return 100.0;
    }

    let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    (mean * 100.0 * 100.0).round() / 100.0
}

/// Mean latency over every probe in the window, rounded to whole milliseconds.
pub fn average_latency_ms(windows: &[MonitorWindow]) -> u64 {
    let probes: u64 = windows.iter().map(|w| w.total).sum();
    if probes == 0 {
        return 0;
    }
    let latency: u64 = windows.iter().map(|w| w.latency_sum_ms).sum();
    (latency as f64 / probes as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(monitor_id: i64, up: u64, total: u64, latency_sum_ms: u64) -> MonitorWindow {
        MonitorWindow { monitor_id, up, total, latency_sum_ms }
    }

    #[test]
    fn test_completion_rate_bounds() {
        assert_eq!(completion_rate(0, 0), 0.0);
        assert_eq!(completion_rate(3, 4), 0.75);
        assert_eq!(completion_rate(4, 4), 1.0);
        // More completed than total can't leak out of [0, 1].
        assert_eq!(completion_rate(9, 4), 1.0);
    }

    #[test]
    fn test_uptime_averages_per_monitor() {
        // 1/2 and 10/10: per-monitor mean is 75%, a probe-weighted mean would be 91.67%.
        let windows = [window(1, 1, 2, 0), window(2, 10, 10, 0)];
        assert_eq!(uptime_percentage(&windows), 75.0);
    }

    #[test]
    fn test_uptime_ignores_unobserved_monitors() {
        let windows = [window(1, 2, 3, 0), window(2, 0, 0, 0)];
        assert_eq!(uptime_percentage(&windows), 66.67);
        assert_eq!(uptime_percentage(&[]), 100.0);
    }

    #[test]
    fn test_average_latency() {
        let windows = [window(1, 1, 2, 300), window(2, 1, 1, 101)];
        assert_eq!(average_latency_ms(&windows), 134);
        assert_eq!(average_latency_ms(&[]), 0);
    }

    #[test]
    fn test_rollup_from_snapshot() {
        let now = Utc::now();
        let snapshot = DashboardSnapshot {
            taken_at: now,
            window_start: now - chrono::Duration::hours(24),
            tasks: TaskCounts {
                total: 4,
                completed: 1,
                overdue: 2,
                pending_by_priority: BTreeMap::from([("high".to_string(), 3)]),
                by_column: vec![ColumnCount { name: "Todo".into(), count: 4 }],
            },
            monitors_by_status: BTreeMap::from([("down".to_string(), 1), ("up".to_string(), 2)]),
            active_incidents: 1,
            probe_windows: vec![window(1, 0, 1, 40)],
            audit: AuditCounts {
                total: 10,
                in_window: 4,
                by_action: BTreeMap::from([("create".to_string(), 10)]),
                by_entity: BTreeMap::from([("monitor".to_string(), 10)]),
            },
        };

        let rollup = DashboardRollup::from_snapshot(&snapshot);

        assert_eq!(rollup.tasks.pending, 3);
        assert_eq!(rollup.tasks.completion_rate, 0.25);
        assert_eq!(rollup.monitoring.total_monitors, 3);
        assert_eq!(rollup.monitoring.open_incidents, 1);
        assert_eq!(rollup.monitoring.uptime_24h, 0.0);
        assert_eq!(rollup.monitoring.avg_response_time_ms, 40);
        assert_eq!(rollup.activity.total_actions, 10);
        assert_eq!(rollup.activity.recent_24h, 4);
    }
}
