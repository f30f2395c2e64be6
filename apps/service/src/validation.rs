//! Input validation for operator-supplied monitors and incidents.

use url::Url;

use crate::database::models::{MonitorUpdate, NewIncident, NewMonitor};
use crate::error::{Error, Result};

const MIN_INTERVAL: u64 = 1;
const MAX_INTERVAL: u64 = 86_400; // 24 hours

const MIN_TIMEOUT: u64 = 1;
const MAX_TIMEOUT: u64 = 300; // 5 minutes

const MAX_NAME_LEN: usize = 200;

pub fn validate_new_monitor(monitor: &NewMonitor) -> Result<()> {
    validate_name(&monitor.name, "monitor name")?;
    validate_target(&monitor.target)?;
    validate_check_interval(monitor.interval_seconds)
}

pub fn validate_monitor_update(update: &MonitorUpdate) -> Result<()> {
    if let Some(name) = &update.name {
        validate_name(name, "monitor name")?;
    }
    if let Some(target) = &update.target {
        validate_target(target)?;
    }
    if let Some(interval) = update.interval_seconds {
        validate_check_interval(interval)?;
    }
    Ok(())
}

pub fn validate_new_incident(incident: &NewIncident) -> Result<()> {
    validate_name(&incident.title, "incident title")
}

fn validate_name(value: &str, what: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{what} must not be empty")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(Error::validation(format!("{what} is longer than {MAX_NAME_LEN} characters")));
    }
    Ok(())
}

/// Targets are absolute http(s) URLs with a host
pub fn validate_target(target: &str) -> Result<()> {
    let url = Url::parse(target.trim())
        .map_err(|e| Error::validation(format!("invalid target URL '{target}': {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(Error::validation(format!("unsupported target scheme: {other}"))),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::validation(format!("target URL '{target}' has no host")));
    }

    if url.port() == Some(0) {
        return Err(Error::validation("port 0 is not valid"));
    }

    Ok(())
}

pub fn validate_check_interval(interval_seconds: u64) -> Result<()> {
    if interval_seconds < MIN_INTERVAL {
        return Err(Error::validation(format!(
            "check interval must be positive (got {interval_seconds})"
        )));
    }

    if interval_seconds > MAX_INTERVAL {
        return Err(Error::validation(format!(
            "check interval too long: {interval_seconds} seconds (maximum: {MAX_INTERVAL})"
        )));
    }

    Ok(())
}

pub fn validate_timeout(timeout_seconds: u64) -> Result<()> {
    if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&timeout_seconds) {
        return Err(Error::validation(format!(
            "probe timeout must be between {MIN_TIMEOUT} and {MAX_TIMEOUT} seconds (got {timeout_seconds})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incidents::state::Severity;

    #[test]
    fn test_validate_target() {
        assert!(validate_target("https://example.com").is_ok());
        assert!(validate_target("http://127.0.0.1:8080/health").is_ok());

        assert!(validate_target("example.com").is_err());
        assert!(validate_target("ftp://example.com").is_err());
        assert!(validate_target("http://example.com:0").is_err());
        assert!(validate_target("").is_err());
    }

    #[test]
    fn test_validate_check_interval() {
        assert!(validate_check_interval(1).is_ok());
        assert!(validate_check_interval(60).is_ok());
        assert!(validate_check_interval(86_400).is_ok());

        assert!(matches!(validate_check_interval(0), Err(Error::Validation(_))));
        assert!(validate_check_interval(100_000).is_err());
    }

    #[test]
    fn test_validate_timeout() {
        assert!(validate_timeout(10).is_ok());
        assert!(validate_timeout(0).is_err());
        assert!(validate_timeout(301).is_err());
    }

    #[test]
    fn test_validate_new_monitor() {
        assert!(validate_new_monitor(&NewMonitor::new("API", "https://api.example.com", 30)).is_ok());
        assert!(validate_new_monitor(&NewMonitor::new("   ", "https://api.example.com", 30)).is_err());
        assert!(validate_new_monitor(&NewMonitor::new("API", "not a url", 30)).is_err());
        assert!(validate_new_monitor(&NewMonitor::new("API", "https://api.example.com", 0)).is_err());
    }

    #[test]
    fn test_validate_monitor_update_checks_only_present_fields() {
        assert!(validate_monitor_update(&MonitorUpdate::default()).is_ok());

        let update = MonitorUpdate { interval_seconds: Some(0), ..Default::default() };
        assert!(validate_monitor_update(&update).is_err());

        let update = MonitorUpdate { name: Some(String::new()), ..Default::default() };
        assert!(validate_monitor_update(&update).is_err());
    }

    #[test]
    fn test_validate_new_incident() {
        assert!(validate_new_incident(&NewIncident::new("Database degraded", Severity::High)).is_ok());
        assert!(validate_new_incident(&NewIncident::new("", Severity::Low)).is_err());
    }
}
