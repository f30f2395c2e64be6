//! Incident manager - opens, acknowledges and resolves incidents.
//!
//! Automatic incidents follow monitor transitions delivered over a bounded
//! queue; manual operations call the manager directly.

pub mod manager;
pub mod state;

pub use manager::{IncidentManager, IncidentWorker};
pub use state::{IncidentAction, IncidentSource, IncidentStatus, Lifecycle, Severity};

/// Title given to an incident opened because `monitor_name` went down.
pub fn automatic_title(monitor_name: &str, reason: Option<&str>) -> String {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => format!("{monitor_name} is down: {reason}"),
        None => format!("{monitor_name} is down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automatic_title() {
        assert_eq!(automatic_title("API", None), "API is down");
        assert_eq!(automatic_title("API", Some("  ")), "API is down");
        assert_eq!(automatic_title("API", Some("Timeout")), "API is down: Timeout");
    }
}
