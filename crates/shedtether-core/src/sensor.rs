//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Current sensing front-ends for the controller."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use async_trait::async_trait;
use parking_lot::Mutex;
use shedtether_common::config::SensorConfig;
use tracing::trace;

use crate::errors::{Result, ShedError};

/// Source of RMS current readings for the tether circuit.
#[async_trait]
pub trait CurrentSensor: Send + Sync {
    /// Take one reading in amps.
    async fn read_amps(&self) -> Result<f64>;
}

/// CT clamp placeholder. Real hardware would sample the ADC here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockCtClamp {
    amps: f64,
}

impl MockCtClamp {
    pub fn new(amps: f64) -> Self {
        Self { amps }
    }
}

#[async_trait]
impl CurrentSensor for MockCtClamp {
    async fn read_amps(&self) -> Result<f64> {
        trace!(amps = self.amps, "mock ct clamp reading");
        checked(self.amps)
    }
}

/// Replays a fixed sequence of readings, wrapping around at the end.
#[derive(Debug)]
pub struct ScriptedSensor {
    readings: Vec<f64>,
    cursor: Mutex<usize>,
}

impl ScriptedSensor {
    pub fn new(readings: Vec<f64>) -> Result<Self> {
        if readings.is_empty() {
            return Err(ShedError::Sensor(
                "scripted sensor requires at least one reading".into(),
            ));
        }
        Ok(Self {
            readings,
            cursor: Mutex::new(0),
        })
    }
}

#[async_trait]
impl CurrentSensor for ScriptedSensor {
    async fn read_amps(&self) -> Result<f64> {
        let amps = {
            let mut cursor = self.cursor.lock();
            let amps = self.readings[*cursor];
            *cursor = (*cursor + 1) % self.readings.len();
            amps
        };
        trace!(amps, "scripted reading");
        checked(amps)
    }
}

/// Build the sensor described by configuration.
pub fn sensor_from_config(config: &SensorConfig) -> Result<Box<dyn CurrentSensor>> {
    match config {
        SensorConfig::Mock { amps } => Ok(Box::new(MockCtClamp::new(*amps))),
        SensorConfig::Scripted { readings } => {
            Ok(Box::new(ScriptedSensor::new(readings.clone())?))
        }
    }
}

fn checked(amps: f64) -> Result<f64> {
    if amps.is_finite() {
        Ok(amps)
    } else {
        Err(ShedError::InvalidReading(amps))
    }
}
