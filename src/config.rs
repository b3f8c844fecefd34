//! Coordinator configuration
//!
//! ## Loading Order
//!
//! 1. Explicit path (`--config`)
//! 2. `RESQTERRA_CONFIG` environment variable
//! 3. `coordinator.toml` in the current working directory
//! 4. Built-in defaults
//!
//! Every field is optional in the file; missing keys keep their default.

use resqterra_shared::defaults;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "RESQTERRA_CONFIG";
pub const LOCAL_CONFIG_FILE: &str = "coordinator.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Battery at or below this forces RTL and releases the vehicle's mission
    pub critical_battery_percent: f64,
    /// Vehicles below this never receive a mission
    pub min_assignment_battery_percent: f64,
    pub ack_timeout_ms: u64,
    /// Minimum gap between two commands to the same vehicle
    pub min_command_interval_ms: u64,
    pub sweep_interval_ms: u64,
    pub history_capacity: usize,
    /// Event names that spawn a rescue mission
    pub rescue_events: Vec<String>,
    pub rescue_priority: i64,
    pub default_priority: i64,
    /// Follow each assignment with an ack-tracked START_MISSION command and
    /// re-queue the mission if the vehicle never confirms
    pub confirm_assignments: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            critical_battery_percent: defaults::BATTERY_CRITICAL_PERCENT,
            min_assignment_battery_percent: defaults::BATTERY_MIN_ASSIGNMENT_PERCENT,
            ack_timeout_ms: defaults::COMMAND_ACK_TIMEOUT_MS,
            min_command_interval_ms: defaults::COMMAND_MIN_INTERVAL_MS,
            sweep_interval_ms: defaults::ASSIGNMENT_SWEEP_INTERVAL_MS,
            history_capacity: defaults::POSITION_HISTORY_CAPACITY,
            rescue_events: defaults::RESCUE_EVENTS.iter().map(|s| s.to_string()).collect(),
            rescue_priority: defaults::RESCUE_MISSION_PRIORITY,
            default_priority: defaults::MISSION_DEFAULT_PRIORITY,
            confirm_assignments: false,
        }
    }
}

impl CoordinatorConfig {
    /// Resolve and load the configuration, then validate it.
    ///
    /// An explicit path must load; env var and local file fall back to the
    /// next source with a warning.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => {
                let config = Self::load_from_file(path)?;
                info!(path = %path.display(), "Loaded coordinator config");
                config
            }
            None => Self::load_fallback(),
        };
        config.validate()?;
        Ok(config)
    }

    fn load_fallback() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            match Self::load_from_file(&p) {
                Ok(config) => {
                    info!(path = %p.display(), "Loaded coordinator config from {}", CONFIG_ENV_VAR);
                    return config;
                }
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                }
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded coordinator config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No coordinator config found, using built-in defaults");
        Self::default()
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("critical_battery_percent", self.critical_battery_percent),
            ("min_assignment_battery_percent", self.min_assignment_battery_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                errors.push(format!("{name} must be within 0-100, got {value}"));
            }
        }
        if self.critical_battery_percent >= self.min_assignment_battery_percent {
            errors.push(format!(
                "critical_battery_percent ({}) must be below min_assignment_battery_percent ({})",
                self.critical_battery_percent, self.min_assignment_battery_percent
            ));
        }
        if self.ack_timeout_ms == 0 {
            errors.push("ack_timeout_ms must be greater than zero".into());
        }
        if self.min_command_interval_ms == 0 {
            errors.push("min_command_interval_ms must be greater than zero".into());
        }
        if self.sweep_interval_ms == 0 {
            errors.push("sweep_interval_ms must be greater than zero".into());
        }
        if self.history_capacity == 0 {
            errors.push("history_capacity must be greater than zero".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn min_command_interval(&self) -> Duration {
        Duration::from_millis(self.min_command_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn is_rescue_event(&self, event: &str) -> bool {
        self.rescue_events.iter().any(|e| e == event)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}
