use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LifecycleConfig {
    pub service: ServiceConfig,
    pub admin: AdminConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Name the service is registered under
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Human-readable description written into the unit file
    #[serde(default = "default_service_description")]
    pub description: String,

    /// Administrative command (install, remove, debug, start, stop, pause,
    /// continue). Unset runs the worker in the foreground.
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AdminConfig {
    /// How long stop, pause and continue wait for the target state
    #[serde(default = "default_admin_timeout_ms")]
    pub timeout_ms: u64,

    /// Interval between state queries while waiting
    #[serde(default = "default_admin_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Directory unit files are installed into
    #[serde(default = "default_unit_dir")]
    pub unit_dir: String,

    /// systemctl program to run
    #[serde(default = "default_systemctl")]
    pub systemctl: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControlConfig {
    /// Delay between the two answers to an interrogate request
    #[serde(default = "default_interrogate_delay_ms")]
    pub interrogate_delay_ms: u64,
}

impl LifecycleConfig {
    /// Load configuration from defaults and `SVCMAIN_` environment variables only
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(None)
    }

    /// Load configuration from a specific file path; a missing file is not an error
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);
        Self::build(Some(&path_str))
    }

    fn build(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("service.name", default_service_name())?
            .set_default("service.description", default_service_description())?
            .set_default("admin.timeout_ms", default_admin_timeout_ms())?
            .set_default("admin.poll_interval_ms", default_admin_poll_interval_ms())?
            .set_default("admin.unit_dir", default_unit_dir())?
            .set_default("admin.systemctl", default_systemctl())?
            .set_default(
                "control.interrogate_delay_ms",
                default_interrogate_delay_ms(),
            )?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        // SVCMAIN_SERVICE__NAME, SVCMAIN_ADMIN__TIMEOUT_MS, ...
        let settings = builder
            .add_source(
                Environment::with_prefix("SVCMAIN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: LifecycleConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.name.trim().is_empty() {
            return Err(ConfigError::Message(
                "Service name must not be empty".to_string(),
            ));
        }

        if self.admin.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Admin timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.admin.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Admin poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.admin.poll_interval_ms > self.admin.timeout_ms {
            return Err(ConfigError::Message(
                "Admin poll_interval_ms must not exceed timeout_ms".to_string(),
            ));
        }

        if self.admin.systemctl.trim().is_empty() {
            return Err(ConfigError::Message(
                "Admin systemctl program must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn admin_timeout(&self) -> Duration {
        Duration::from_millis(self.admin.timeout_ms)
    }

    pub fn admin_poll_interval(&self) -> Duration {
        Duration::from_millis(self.admin.poll_interval_ms)
    }

    pub fn interrogate_delay(&self) -> Duration {
        Duration::from_millis(self.control.interrogate_delay_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: default_service_name(),
                description: default_service_description(),
                command: None,
            },
            admin: AdminConfig {
                timeout_ms: default_admin_timeout_ms(),
                poll_interval_ms: default_admin_poll_interval_ms(),
                unit_dir: default_unit_dir(),
                systemctl: default_systemctl(),
            },
            control: ControlConfig {
                interrogate_delay_ms: default_interrogate_delay_ms(),
            },
        }
    }
}

// Default value functions
fn default_service_name() -> String {
    "svcmain".to_string()
}
fn default_service_description() -> String {
    "svcmain worker service".to_string()
}

fn default_admin_timeout_ms() -> u64 {
    10_000
}
fn default_admin_poll_interval_ms() -> u64 {
    300
}
fn default_unit_dir() -> String {
    "/etc/systemd/system".to_string()
}
fn default_systemctl() -> String {
    "systemctl".to_string()
}

fn default_interrogate_delay_ms() -> u64 {
    100
}
