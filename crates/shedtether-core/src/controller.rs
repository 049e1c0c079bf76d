//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Load-shedding control loop and its collaborators."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shedtether_common::config::{AppConfig, DeviceConfig};
use shedtether_metrics::{ControllerMetrics, ReportOutcome};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::cloud::{CloudClient, Delivery, ReportSink};
use crate::errors::Result;
use crate::policy::{LoadPolicy, RelayStatus};
use crate::relay::{Relay, StubRelay};
use crate::report::ShedReport;
use crate::sensor::{sensor_from_config, CurrentSensor};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// What happened to the report of one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint answered (any status).
    Delivered(Delivery),
    /// The request never completed; the reason is the rendered error.
    Failed(String),
}

/// Result of a single read/decide/report pass.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationOutcome {
    pub current_amps: f64,
    pub relay_status: RelayStatus,
    /// Relay was tripped successfully during this iteration.
    pub relay_triggered: bool,
    pub delivery: DeliveryOutcome,
}

/// Drives the sensor → policy → relay → report cycle on a fixed delay.
pub struct ShedController {
    device: DeviceConfig,
    sensor: Box<dyn CurrentSensor>,
    relay: Arc<dyn Relay>,
    sink: Arc<dyn ReportSink>,
    policy: LoadPolicy,
    interval: Duration,
    max_iterations: Option<u64>,
    metrics: Option<ControllerMetrics>,
}

impl ShedController {
    pub fn new(
        device: DeviceConfig,
        sensor: Box<dyn CurrentSensor>,
        relay: Arc<dyn Relay>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            device,
            sensor,
            relay,
            sink,
            policy: LoadPolicy::default(),
            interval: DEFAULT_INTERVAL,
            max_iterations: None,
            metrics: None,
        }
    }

    /// Wire the configured sensor, the stub relay, and the HTTP cloud client.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let sensor = sensor_from_config(&config.sensor).context("failed to build sensor")?;
        let sink = CloudClient::from_config(&config.cloud).context("failed to build cloud client")?;
        let mut controller = Self::new(
            config.device.clone(),
            sensor,
            Arc::new(StubRelay::new()),
            Arc::new(sink),
        )
        .with_policy(LoadPolicy::from_config(&config.policy))
        .with_interval(config.controller.interval);
        controller.max_iterations = config.controller.max_iterations;
        Ok(controller)
    }

    pub fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one iteration.
    ///
    /// Returns an error only when the sensor fails, in which case nothing is
    /// reported. Relay and delivery failures are logged and folded into the
    /// outcome.
    pub async fn run_once(&self) -> Result<IterationOutcome> {
        let current_amps = self.sensor.read_amps().await?;
        let relay_status = self.policy.evaluate(current_amps);

        let mut relay_triggered = false;
        if relay_status.is_shedding() {
            match self.relay.trigger_off().await {
                Ok(()) => relay_triggered = true,
                Err(err) => {
                    error!(shed_id = %self.device.shed_id, error = %err, "failed to trip relay")
                }
            }
            warn!(
                shed_id = %self.device.shed_id,
                current_amps,
                threshold_amps = self.policy.threshold_amps(),
                "load shedding active"
            );
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_reading(current_amps, relay_status.is_shedding());
        }

        let report = ShedReport::new(&self.device, current_amps, relay_status);
        let delivery = match self.sink.push(&report).await {
            Ok(delivery) => {
                if delivery.accepted {
                    info!(status = delivery.status, current_amps, relay_status = %relay_status, "cloud sync succeeded");
                } else {
                    warn!(status = delivery.status, current_amps, relay_status = %relay_status, "cloud sync rejected by endpoint");
                }
                self.record_report(if delivery.accepted {
                    ReportOutcome::Accepted
                } else {
                    ReportOutcome::Rejected
                });
                DeliveryOutcome::Delivered(delivery)
            }
            Err(err) => {
                warn!(error = %err, current_amps, relay_status = %relay_status, "cloud sync failed");
                self.record_report(ReportOutcome::Failed);
                DeliveryOutcome::Failed(err.to_string())
            }
        };

        Ok(IterationOutcome {
            current_amps,
            relay_status,
            relay_triggered,
            delivery,
        })
    }

    /// Loop until `shutdown` fires (or its sender is dropped), or until the
    /// configured iteration limit is reached. Sleeps the fixed interval after
    /// each iteration completes. Returns the number of iterations run.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        info!(
            shed_id = %self.device.shed_id,
            threshold_amps = self.policy.threshold_amps(),
            interval_ms = self.interval.as_millis() as u64,
            max_iterations = ?self.max_iterations,
            "control loop started"
        );
        let mut iterations: u64 = 0;
        loop {
            match self.run_once().await {
                Ok(outcome) => {
                    debug!(iteration = iterations, outcome = ?outcome, "iteration complete")
                }
                Err(err) => error!(iteration = iterations, error = %err, "iteration aborted"),
            }
            iterations += 1;

            if self.max_iterations.is_some_and(|max| iterations >= max) {
                info!(iterations, "iteration limit reached");
                break;
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!(iterations, "shutdown requested; stopping control loop");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        iterations
    }

    fn record_report(&self, outcome: ReportOutcome) {
        if let Some(metrics) = &self.metrics {
            metrics.record_report(outcome);
        }
    }
}
