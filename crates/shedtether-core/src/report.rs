//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Status report pushed to the cloud endpoint."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use shedtether_common::config::DeviceConfig;

use crate::errors::Result;
use crate::policy::RelayStatus;

/// Per-iteration status record. Built, pushed, and dropped within one loop pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShedReport {
    pub shed_id: String,
    pub current_amps: f64,
    pub relay_status: RelayStatus,
    pub auth_token: String,
}

impl ShedReport {
    pub fn new(device: &DeviceConfig, current_amps: f64, relay_status: RelayStatus) -> Self {
        Self {
            shed_id: device.shed_id.clone(),
            current_amps,
            relay_status,
            auth_token: device.auth_token.clone(),
        }
    }

    /// JSON request body.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
