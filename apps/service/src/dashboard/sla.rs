use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service level targets every report is measured against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaTarget {
    pub name: String,
    /// Percentage, e.g. 99.9
    pub uptime_target: f64,
    pub response_time_p95_ms: u64,
    /// Time allowed between an incident starting and its acknowledgement
    pub incident_response_minutes: u64,
    /// Time allowed between an incident starting and its resolution
    pub incident_resolution_hours: u64,
}

impl Default for SlaTarget {
    fn default() -> Self {
        Self {
            name: "Standard".into(),
            uptime_target: 99.9,
            response_time_p95_ms: 500,
            incident_response_minutes: 15,
            incident_resolution_hours: 4,
        }
    }
}

/// Probe outcomes of one monitor inside the report window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSample {
    pub monitor_id: i64,
    pub name: String,
    pub total: u64,
    pub up: u64,
    /// Latencies of the successful probes, ascending
    pub latencies_ms: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncidentTimes {
    pub started_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Everything an SLA report reads, taken from one storage snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct SlaSnapshot {
    pub taken_at: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub monitors: Vec<MonitorSample>,
    /// Incidents started inside the window, any monitor or none
    pub incidents: Vec<IncidentTimes>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UptimeReport {
    pub monitor_id: i64,
    pub period_hours: i64,
    pub total_checks: u64,
    pub successful_checks: u64,
    pub failed_checks: u64,
    /// Percentage rounded to four decimals, 100 without checks
    pub uptime_percentage: f64,
    pub sla_target: f64,
    pub sla_met: bool,
    pub sla_breach_margin: f64,
}

impl UptimeReport {
    pub fn new(sample: &MonitorSample, period_hours: i64, target: &SlaTarget) -> Self {
        let up = sample.up.min(sample.total);
        let uptime = if sample.total == 0 {
            100.0
        } else {
            round_to(up as f64 / sample.total as f64 * 100.0, 4)
        };

        Self {
            monitor_id: sample.monitor_id,
            period_hours,
            total_checks: sample.total,
            successful_checks: up,
            failed_checks: sample.total - up,
            uptime_percentage: uptime,
            sla_target: target.uptime_target,
            sla_met: uptime >= target.uptime_target,
            sla_breach_margin: round_to(uptime - target.uptime_target, 4),
        }
    }
}

/// Latency distribution of successful probes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseTimeReport {
    pub monitor_id: i64,
    pub period_hours: i64,
    pub sample_count: usize,
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
    pub avg_ms: Option<u64>,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
    pub sla_target_p95_ms: u64,
    /// `None` when there is nothing to measure
    pub sla_met: Option<bool>,
}

impl ResponseTimeReport {
    pub fn new(sample: &MonitorSample, period_hours: i64, target: &SlaTarget) -> Self {
        let sorted = &sample.latencies_ms;
        let avg_ms = (!sorted.is_empty()).then(|| {
            (sorted.iter().sum::<u64>() as f64 / sorted.len() as f64).round() as u64
        });
        let p95_ms = percentile(sorted, 95);

        Self {
            monitor_id: sample.monitor_id,
            period_hours,
            sample_count: sorted.len(),
            min_ms: sorted.first().copied(),
            max_ms: sorted.last().copied(),
            avg_ms,
            p50_ms: percentile(sorted, 50),
            p95_ms,
            p99_ms: percentile(sorted, 99),
            sla_target_p95_ms: target.response_time_p95_ms,
            sla_met: p95_ms.map(|p95| p95 <= target.response_time_p95_ms),
        }
    }
}

/// Nearest-rank percentile over ascending values: index `len * p / 100`,
/// clamped to the last element.
pub fn percentile(sorted: &[u64], p: u32) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = sorted.len() * p as usize / 100;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}

/// Mean time to acknowledge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MttaReport {
    pub period_hours: i64,
    pub acknowledged_incidents: usize,
    pub mtta_minutes: Option<f64>,
    pub min_ack_minutes: Option<f64>,
    pub max_ack_minutes: Option<f64>,
    pub sla_target_minutes: u64,
    pub sla_breaches: usize,
    pub sla_met: Option<bool>,
}

impl MttaReport {
    pub fn new(incidents: &[IncidentTimes], period_hours: i64, target: &SlaTarget) -> Self {
        let minutes: Vec<f64> = incidents
            .iter()
            .filter_map(|i| i.acknowledged_at.map(|at| minutes_between(i.started_at, at)))
            .collect();
        let limit = target.incident_response_minutes as f64;
        let breaches = minutes.iter().filter(|m| **m > limit).count();
        let stats = MinuteStats::of(&minutes);

        Self {
            period_hours,
            acknowledged_incidents: minutes.len(),
            mtta_minutes: stats.map(|s| round_to(s.mean, 1)),
            min_ack_minutes: stats.map(|s| round_to(s.min, 1)),
            max_ack_minutes: stats.map(|s| round_to(s.max, 1)),
            sla_target_minutes: target.incident_response_minutes,
            sla_breaches: breaches,
            sla_met: stats.map(|_| breaches == 0),
        }
    }
}

/// Mean time to recovery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MttrReport {
    pub period_hours: i64,
    pub resolved_incidents: usize,
    pub mttr_minutes: Option<f64>,
    pub mttr_hours: Option<f64>,
    pub min_resolution_minutes: Option<f64>,
    pub max_resolution_minutes: Option<f64>,
    pub sla_target_hours: u64,
    pub sla_breaches: usize,
    pub sla_met: Option<bool>,
}

impl MttrReport {
    pub fn new(incidents: &[IncidentTimes], period_hours: i64, target: &SlaTarget) -> Self {
        let minutes: Vec<f64> = incidents
            .iter()
            .filter_map(|i| i.resolved_at.map(|at| minutes_between(i.started_at, at)))
            .collect();
        let limit = target.incident_resolution_hours as f64 * 60.0;
        let breaches = minutes.iter().filter(|m| **m > limit).count();
        let stats = MinuteStats::of(&minutes);

        Self {
            period_hours,
            resolved_incidents: minutes.len(),
            mttr_minutes: stats.map(|s| round_to(s.mean, 1)),
            mttr_hours: stats.map(|s| round_to(s.mean / 60.0, 2)),
            min_resolution_minutes: stats.map(|s| round_to(s.min, 1)),
            max_resolution_minutes: stats.map(|s| round_to(s.max, 1)),
            sla_target_hours: target.incident_resolution_hours,
            sla_breaches: breaches,
            sla_met: stats.map(|_| breaches == 0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MinuteStats {
    mean: f64,
    min: f64,
    max: f64,
}

impl MinuteStats {
    fn of(minutes: &[f64]) -> Option<Self> {
        if minutes.is_empty() {
            return None;
        }
        Some(Self {
            mean: minutes.iter().sum::<f64>() / minutes.len() as f64,
            min: minutes.iter().copied().fold(f64::INFINITY, f64::min),
            max: minutes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentMetrics {
    pub mtta: MttaReport,
    pub mttr: MttrReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSla {
    pub monitor_id: i64,
    pub name: String,
    pub uptime: UptimeReport,
    pub response_time: ResponseTimeReport,
}

/// Compliance of every monitor and of incident handling against one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaReport {
    pub generated_at: DateTime<Utc>,
    pub period_hours: i64,
    pub period_days: i64,
    pub target: SlaTarget,
    pub incident_metrics: IncidentMetrics,
    pub monitors: Vec<MonitorSla>,
    /// False as soon as any measured figure misses its target
    pub overall_sla_compliance: bool,
}

impl SlaReport {
    pub fn from_snapshot(snapshot: &SlaSnapshot, target: &SlaTarget) -> Self {
        let period_hours = (snapshot.taken_at - snapshot.window_start).num_hours();

        let monitors: Vec<MonitorSla> = snapshot
            .monitors
            .iter()
            .map(|sample| MonitorSla {
                monitor_id: sample.monitor_id,
                name: sample.name.clone(),
                uptime: UptimeReport::new(sample, period_hours, target),
                response_time: ResponseTimeReport::new(sample, period_hours, target),
            })
            .collect();
        let incident_metrics = IncidentMetrics {
            mtta: MttaReport::new(&snapshot.incidents, period_hours, target),
            mttr: MttrReport::new(&snapshot.incidents, period_hours, target),
        };

        let overall_sla_compliance = monitors
            .iter()
            .all(|m| m.uptime.sla_met && m.response_time.sla_met != Some(false))
            && incident_metrics.mtta.sla_met != Some(false)
            && incident_metrics.mttr.sla_met != Some(false);

        Self {
            generated_at: snapshot.taken_at,
            period_hours,
            period_days: period_hours / 24,
            target: target.clone(),
            incident_metrics,
            monitors,
            overall_sla_compliance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Excellent,
    Good,
    Degraded,
    Critical,
}

impl HealthStatus {
    fn from_score(score: u8) -> Self {
        match score {
            90.. => HealthStatus::Excellent,
            70..=89 => HealthStatus::Good,
            50..=69 => HealthStatus::Degraded,
            _ => HealthStatus::Critical,
        }
    }
}

/// One 0-100 figure summarising an SLA report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthScore {
    pub score: u8,
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub period_hours: i64,
}

impl HealthScore {
    /// Start from 100 and subtract capped penalties: up to 40 per monitor
    /// below its uptime target, up to 20 per monitor over its p95 target,
    /// and up to 20 each for MTTA and MTTR over target.
    pub fn from_report(report: &SlaReport) -> Self {
        let target = &report.target;
        let mut score = 100.0_f64;
        let mut issues = Vec::new();

        for monitor in &report.monitors {
            let uptime = monitor.uptime.uptime_percentage;
            if uptime < target.uptime_target {
                score -= ((target.uptime_target - uptime) * 10.0).min(40.0);
                issues.push(format!("{} uptime: {}%", monitor.name, uptime));
            }
        }

        let p95_target = target.response_time_p95_ms;
        for monitor in &report.monitors {
            if let Some(p95) = monitor.response_time.p95_ms.filter(|p95| *p95 > p95_target) {
                score -= ((p95 - p95_target) as f64 / 100.0).min(20.0);
                issues.push(format!("High p95 response time: {p95}ms"));
            }
        }

        let response_target = target.incident_response_minutes as f64;
        if let Some(mtta) = report.incident_metrics.mtta.mtta_minutes.filter(|m| *m > response_target) {
            score -= ((mtta - response_target) / 5.0).min(20.0);
            issues.push(format!("High MTTA: {mtta:.1}min"));
        }

        let resolution_target = target.incident_resolution_hours as f64;
        if let Some(mttr) = report.incident_metrics.mttr.mttr_hours.filter(|h| *h > resolution_target) {
            score -= ((mttr - resolution_target) * 5.0).min(20.0);
            issues.push(format!("High MTTR: {mttr:.1}h"));
        }

        let score = score.round().clamp(0.0, 100.0) as u8;
        Self {
            score,
            status: HealthStatus::from_score(score),
            issues,
            period_hours: report.period_hours,
        }
    }
}
