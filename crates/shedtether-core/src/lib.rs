//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Load-shedding control loop and its collaborators."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Current sensing, threshold policy, relay actuation, and cloud reporting
//! for the ShedTether controller.

pub mod cloud;
pub mod controller;
pub mod errors;
pub mod policy;
pub mod relay;
pub mod report;
pub mod sensor;

pub use cloud::{CloudClient, Delivery, ReportSink};
pub use controller::{DeliveryOutcome, IterationOutcome, ShedController};
pub use errors::{Result, ShedError};
pub use policy::{evaluate, LoadPolicy, RelayStatus, DEFAULT_THRESHOLD_AMPS};
pub use relay::{Relay, StubRelay};
pub use report::ShedReport;
pub use sensor::{sensor_from_config, CurrentSensor, MockCtClamp, ScriptedSensor};
