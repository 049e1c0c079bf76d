//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Load-shedding control loop and its collaborators."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};
use shedtether_common::config::PolicyConfig;

pub use shedtether_common::config::DEFAULT_THRESHOLD_AMPS;

/// Relay state reported alongside each reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelayStatus {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "SHEDDING_LOAD")]
    SheddingLoad,
}

impl RelayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayStatus::On => "ON",
            RelayStatus::SheddingLoad => "SHEDDING_LOAD",
        }
    }

    pub fn is_shedding(&self) -> bool {
        matches!(self, RelayStatus::SheddingLoad)
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shed when `current_amps` strictly exceeds `threshold_amps`.
pub fn evaluate(current_amps: f64, threshold_amps: f64) -> RelayStatus {
    if current_amps > threshold_amps {
        RelayStatus::SheddingLoad
    } else {
        RelayStatus::On
    }
}

/// Single-threshold load policy. Stateless: each reading is judged on its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadPolicy {
    threshold_amps: f64,
}

impl LoadPolicy {
    pub fn new(threshold_amps: f64) -> Self {
        Self { threshold_amps }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(config.threshold_amps)
    }

    pub fn threshold_amps(&self) -> f64 {
        self.threshold_amps
    }

    pub fn evaluate(&self, current_amps: f64) -> RelayStatus {
        evaluate(current_amps, self.threshold_amps)
    }
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_AMPS)
    }
}
