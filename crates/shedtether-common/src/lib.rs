//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the controller runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Shared primitives for the ShedTether workspace: configuration loading,
//! tracing initialisation, and build metadata.

pub mod config;
pub mod logging;
pub mod version;

pub use config::{
    AppConfig, CloudConfig, ControllerConfig, DeviceConfig, LoadedAppConfig, LoggingConfig,
    MetricsConfig, PolicyConfig, SensorConfig, DEFAULT_THRESHOLD_AMPS,
};
pub use logging::{init_tracing, LogFormat};
pub use version::VersionInfo;
