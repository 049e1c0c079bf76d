//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the controller runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

/// Load threshold applied when no `[policy]` section overrides it.
pub const DEFAULT_THRESHOLD_AMPS: f64 = 14.5;

const DEFAULT_ENDPOINT: &str = "https://us-central1-placed-app.cloudfunctions.net/updateShedStats";

fn default_shed_id() -> String {
    "SHED_802_NB".to_owned()
}

fn default_auth_token() -> String {
    "PLACED_SECURE_TOKEN_2026".to_owned()
}

fn default_mock_amps() -> f64 {
    12.4
}

fn default_threshold_amps() -> f64 {
    DEFAULT_THRESHOLD_AMPS
}

fn default_endpoint() -> Url {
    Url::parse(DEFAULT_ENDPOINT).expect("valid default cloud endpoint")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_loop_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9898"
        .parse()
        .expect("valid default metrics address")
}

/// Primary configuration object for the controller.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
///
/// `source` is `None` when no file was found and built-in defaults apply.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "SHEDTETHER_CONFIG";

    /// Load configuration from disk, respecting the `SHEDTETHER_CONFIG` override.
    pub fn load<P: AsRef<Path>>(explicit: Option<&Path>, candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(explicit, candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// The `SHEDTETHER_CONFIG` path and the `explicit` path (in that order)
    /// must exist when given. Candidate paths are checked in order and skipped
    /// when missing; if none exist the defaults are returned.
    pub fn load_with_source<P: AsRef<Path>>(
        explicit: Option<&Path>,
        candidates: &[P],
    ) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        if let Some(path) = explicit {
            let config = Self::from_path(path)?;
            return Ok(LoadedAppConfig {
                config,
                source: Some(path.to_path_buf()),
            });
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        let inspected = candidates
            .iter()
            .map(|p| p.as_ref().display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        debug!(%inspected, "no configuration file found; using defaults");
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.device.validate()?;
        self.sensor.validate()?;
        self.policy.validate()?;
        self.cloud.validate()?;
        self.controller.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Static identity attached to every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_shed_id")]
    pub shed_id: String,
    #[serde(default = "default_auth_token")]
    pub auth_token: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            shed_id: default_shed_id(),
            auth_token: default_auth_token(),
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shed_id.trim().is_empty() {
            return Err(anyhow!("device.shed_id must not be empty"));
        }
        Ok(())
    }
}

/// Current sensor backing the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SensorConfig {
    /// CT clamp placeholder returning a constant reading.
    Mock {
        #[serde(default = "default_mock_amps")]
        amps: f64,
    },
    /// Replays `readings` in order, wrapping around at the end.
    Scripted { readings: Vec<f64> },
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig::Mock {
            amps: default_mock_amps(),
        }
    }
}

impl SensorConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            SensorConfig::Mock { amps } => {
                if !amps.is_finite() {
                    return Err(anyhow!("sensor.amps must be a finite number"));
                }
            }
            SensorConfig::Scripted { readings } => {
                if readings.is_empty() {
                    return Err(anyhow!("scripted sensor requires at least one reading"));
                }
                if let Some(bad) = readings.iter().find(|r| !r.is_finite()) {
                    return Err(anyhow!("scripted sensor reading {} is not finite", bad));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_threshold_amps")]
    pub threshold_amps: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            threshold_amps: default_threshold_amps(),
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold_amps.is_finite() || self.threshold_amps <= 0.0 {
            return Err(anyhow!(
                "policy.threshold_amps must be a positive finite number, got {}",
                self.threshold_amps
            ));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: Url,
    #[serde(default = "default_request_timeout", rename = "timeout_seconds")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout: default_request_timeout(),
        }
    }
}

impl CloudConfig {
    pub fn validate(&self) -> Result<()> {
        match self.endpoint.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "cloud.endpoint must use http or https, got scheme '{}'",
                    other
                ))
            }
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("cloud.timeout_seconds must be greater than zero"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_loop_interval", rename = "interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
    /// Stop after this many iterations; runs until shutdown when unset.
    #[serde(default)]
    pub max_iterations: Option<u64>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval: default_loop_interval(),
            max_iterations: None,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(anyhow!("controller.interval_ms must be greater than zero"));
        }
        if self.max_iterations == Some(0) {
            return Err(anyhow!("controller.max_iterations must be at least 1 when set"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the daily rolling log file. File logging is off when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}
