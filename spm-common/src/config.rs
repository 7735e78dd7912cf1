//! Configuration loading for the study-plan monitor
//!
//! Settings are resolved in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SPM_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: a warning is logged and defaults are
//! used. A TOML file that exists but cannot be parsed is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ENV_CONFIG_FILE: &str = "SPM_CONFIG";
pub const ENV_DATABASE_PATH: &str = "SPM_DATABASE_PATH";
pub const ENV_SCHOOL_NAME: &str = "SPM_SCHOOL_NAME";
pub const ENV_ENVIRONMENT: &str = "SPM_ENVIRONMENT";
pub const ENV_ORGANIZATION_ID: &str = "SPM_ORGANIZATION_ID";
pub const ENV_ALERT_WEBHOOK_URL: &str = "SPM_ALERT_WEBHOOK_URL";
pub const ENV_LOG_LEVEL: &str = "SPM_LOG_LEVEL";

/// Default poll cadence for both entry points, in minutes
pub const DEFAULT_INTERVAL_MINUTES: u32 = 15;

/// Bootstrap configuration as written in the TOML file
///
/// Every field is optional; absent values fall through to compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub school_name: Option<String>,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub organization_id: Option<String>,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub alert: AlertConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Poll cadence of the two reconciliation entry points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval")]
    pub student_course_interval_minutes: u32,

    #[serde(default = "default_interval")]
    pub learning_item_interval_minutes: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            student_course_interval_minutes: DEFAULT_INTERVAL_MINUTES,
            learning_item_interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

/// Alert sink settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Incoming webhook; alerts go to the log when unset
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_interval() -> u32 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub organization_id: Option<String>,
    pub student_course_interval_minutes: Option<u32>,
    pub learning_item_interval_minutes: Option<u32>,
    pub log_level: Option<String>,
}

/// Fully resolved monitor configuration
///
/// Built once at startup and handed to the service; nothing reads
/// configuration from global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub database_path: PathBuf,
    pub school_name: String,
    pub environment: String,
    pub organization_id: String,
    pub student_course_interval_minutes: u32,
    pub learning_item_interval_minutes: u32,
    pub alert_webhook_url: Option<String>,
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            school_name: "unknown-school".to_string(),
            environment: "local".to_string(),
            organization_id: String::new(),
            student_course_interval_minutes: DEFAULT_INTERVAL_MINUTES,
            learning_item_interval_minutes: DEFAULT_INTERVAL_MINUTES,
            alert_webhook_url: None,
            log_level: default_log_level(),
        }
    }
}

impl MonitorConfig {
    /// Resolve configuration from CLI overrides, environment, TOML and defaults
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let toml_path = overrides
            .config_file
            .clone()
            .or_else(|| std::env::var(ENV_CONFIG_FILE).ok().map(PathBuf::from))
            .or_else(find_config_file);

        let toml_config = match toml_path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                load_toml_config(&path)?
            }
            Some(path) => {
                warn!("Config file {} not found, using defaults", path.display());
                TomlConfig::default()
            }
            None => {
                warn!("No config file found, using defaults");
                TomlConfig::default()
            }
        };

        let config = Self::merge(overrides, &toml_config);
        config.validate()?;
        Ok(config)
    }

    /// Apply the priority order to one TOML document
    pub fn merge(overrides: &ConfigOverrides, toml_config: &TomlConfig) -> Self {
        let defaults = Self::default();

        Self {
            database_path: overrides
                .database_path
                .clone()
                .or_else(|| env_value(ENV_DATABASE_PATH).map(PathBuf::from))
                .or_else(|| toml_config.database_path.clone())
                .unwrap_or(defaults.database_path),
            school_name: env_value(ENV_SCHOOL_NAME)
                .or_else(|| toml_config.school_name.clone())
                .unwrap_or(defaults.school_name),
            environment: env_value(ENV_ENVIRONMENT)
                .or_else(|| toml_config.environment.clone())
                .unwrap_or(defaults.environment),
            organization_id: overrides
                .organization_id
                .clone()
                .or_else(|| env_value(ENV_ORGANIZATION_ID))
                .or_else(|| toml_config.organization_id.clone())
                .unwrap_or(defaults.organization_id),
            student_course_interval_minutes: overrides
                .student_course_interval_minutes
                .unwrap_or(toml_config.schedule.student_course_interval_minutes),
            learning_item_interval_minutes: overrides
                .learning_item_interval_minutes
                .unwrap_or(toml_config.schedule.learning_item_interval_minutes),
            alert_webhook_url: env_value(ENV_ALERT_WEBHOOK_URL)
                .or_else(|| toml_config.alert.webhook_url.clone()),
            log_level: overrides
                .log_level
                .clone()
                .or_else(|| env_value(ENV_LOG_LEVEL))
                .unwrap_or_else(|| toml_config.logging.level.clone()),
        }
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.student_course_interval_minutes == 0 {
            return Err(Error::Config(
                "student_course_interval_minutes must be greater than 0".to_string(),
            ));
        }
        if self.learning_item_interval_minutes == 0 {
            return Err(Error::Config(
                "learning_item_interval_minutes must be greater than 0".to_string(),
            ));
        }
        if let Some(url) = &self.alert_webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!("Invalid alert webhook url: {}", url)));
            }
        }
        Ok(())
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
}

/// Look for `~/.config/spm/config.toml`, then `/etc/spm/config.toml`
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("spm").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/spm/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("spm").join("spm.db"))
        .unwrap_or_else(|| PathBuf::from("./spm_data/spm.db"))
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_sections_parse() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            school_name = "Manabie School"
            environment = "stag"

            [schedule]
            learning_item_interval_minutes = 5

            [alert]
            webhook_url = "https://hooks.example.com/T000/B000"
            "#,
        )
        .unwrap();

        assert_eq!(toml_config.school_name.as_deref(), Some("Manabie School"));
        assert_eq!(toml_config.schedule.learning_item_interval_minutes, 5);
        assert_eq!(
            toml_config.schedule.student_course_interval_minutes,
            DEFAULT_INTERVAL_MINUTES
        );
        assert_eq!(toml_config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = MonitorConfig {
            learning_item_interval_minutes: 0,
            ..MonitorConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_non_http_webhook() {
        let config = MonitorConfig {
            alert_webhook_url: Some("ftp://example.com".to_string()),
            ..MonitorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
