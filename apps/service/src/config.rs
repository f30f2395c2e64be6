use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};

use crate::dashboard::SlaTarget;
use crate::incidents::state::Severity;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("failed to write config: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("no config path available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub monitoring: MonitoringConfig,
    pub dashboard: DashboardConfig,
    pub sla: SlaTarget,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Hard bound on a single probe, in seconds (1..=300)
    pub probe_timeout_seconds: u64,
    pub max_concurrent_probes: usize,
    /// Upper bound of the random delay before a new monitor's first probe
    pub startup_jitter_ms: u64,
    pub transition_queue_capacity: usize,
    /// Severity given to monitors created without one
    pub default_severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub window_hours: i64,
    /// Default period of SLA reports and incident response figures
    pub sla_window_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: path::PathBuf::from("vigil.db"), pool_size: 8 }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            probe_timeout_seconds: 10,
            max_concurrent_probes: 32,
            startup_jitter_ms: 2_000,
            transition_queue_capacity: 256,
            default_severity: Severity::Critical,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { window_hours: 24, sla_window_hours: 720 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1".into(), port: 8080 }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Pool Size", &self.database.pool_size)?;
        write_title_1(f, "Monitoring")?;
        write_1(f, "Probe Timeout (s)", &self.monitoring.probe_timeout_seconds)?;
        write_1(f, "Max Concurrent Probes", &self.monitoring.max_concurrent_probes)?;
        write_1(f, "Startup Jitter (ms)", &self.monitoring.startup_jitter_ms)?;
        write_1(f, "Transition Queue", &self.monitoring.transition_queue_capacity)?;
        write_1(f, "Default Severity", &self.monitoring.default_severity)?;
        write_title_1(f, "Dashboard")?;
        write_1(f, "Window (h)", &self.dashboard.window_hours)?;
        write_1(f, "SLA Window (h)", &self.dashboard.sla_window_hours)?;
        write_title_1(f, "SLA")?;
        write_1(f, "Name", &self.sla.name)?;
        write_1(f, "Uptime Target (%)", &self.sla.uptime_target)?;
        write_1(f, "p95 Target (ms)", &self.sla.response_time_p95_ms)?;
        write_1(f, "Response Target (min)", &self.sla.incident_response_minutes)?;
        write_1(f, "Resolution Target (h)", &self.sla.incident_resolution_hours)?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// use vigil_service::config::Config;
    ///
    /// let cfg = Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), vigil_service::config::Error>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            toml::from_str::<Self>(raw_string.as_str())?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validation::validate_timeout(self.monitoring.probe_timeout_seconds)
            .map_err(|e| Error::Invalid(e.to_string()))?;

        if self.database.pool_size == 0 {
            return Err(Error::Invalid("database.pool_size must be at least 1".into()));
        }
        if self.monitoring.max_concurrent_probes == 0 {
            return Err(Error::Invalid("monitoring.max_concurrent_probes must be at least 1".into()));
        }
        if self.monitoring.transition_queue_capacity == 0 {
            return Err(Error::Invalid(
                "monitoring.transition_queue_capacity must be at least 1".into(),
            ));
        }
        if self.dashboard.window_hours <= 0 {
            return Err(Error::Invalid("dashboard.window_hours must be positive".into()));
        }
        if self.dashboard.sla_window_hours <= 0 {
            return Err(Error::Invalid("dashboard.sla_window_hours must be positive".into()));
        }
        for hours in [self.dashboard.window_hours, self.dashboard.sla_window_hours] {
            if chrono::Duration::try_hours(hours).is_none() {
                return Err(Error::Invalid(format!("window of {hours} hours is out of range")));
            }
        }
        if !(self.sla.uptime_target > 0.0 && self.sla.uptime_target <= 100.0) {
            return Err(Error::Invalid("sla.uptime_target must be within (0, 100]".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config::from_config(Some(&path)).unwrap();

        assert!(path.exists());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.dashboard.window_hours, 24);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[monitoring]\nprobe_timeout_seconds = 5\ndefault_severity = \"high\"\n")
            .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();

        assert_eq!(config.monitoring.probe_timeout_seconds, 5);
        assert_eq!(config.monitoring.default_severity, Severity::High);
        assert_eq!(config.monitoring.max_concurrent_probes, 32);
    }

    #[test]
    fn test_out_of_range_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[monitoring]\nprobe_timeout_seconds = 0\n").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_sla_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sla]\nname = \"Premium\"\nuptime_target = 99.99\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.sla.name, "Premium");
        assert_eq!(config.sla.uptime_target, 99.99);
        assert_eq!(config.sla.response_time_p95_ms, 500);
        assert_eq!(config.dashboard.sla_window_hours, 720);

        fs::write(&path, "[sla]\nuptime_target = 120.0\n").unwrap();
        assert!(matches!(Config::from_config(Some(&path)), Err(Error::Invalid(_))));
    }

    #[test]
    fn test_display_lists_sections() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("Monitoring"));
        assert!(rendered.contains("Port: 8080"));
    }
}
