//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Load-shedding control loop and its collaborators."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShedError>;

#[derive(Debug, Error)]
pub enum ShedError {
    #[error("sensor returned a non-finite reading: {0}")]
    InvalidReading(f64),
    #[error("sensor read failed: {0}")]
    Sensor(String),
    #[error("relay actuation failed: {0}")]
    Relay(String),
    #[error("cloud sync failed: {0}")]
    Sync(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
