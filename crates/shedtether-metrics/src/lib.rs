//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across the workspace.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let local_addr = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %local_addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address; resolves port `0` to the assigned port.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Outcome label values used by [`ControllerMetrics::record_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The endpoint answered with a 2xx status.
    Accepted,
    /// The endpoint answered with a non-2xx status.
    Rejected,
    /// No response was received.
    Failed,
}

impl ReportOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportOutcome::Accepted => "accepted",
            ReportOutcome::Rejected => "rejected",
            ReportOutcome::Failed => "failed",
        }
    }
}

/// Metrics recorded by the load-shedding control loop.
#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    iterations: IntCounter,
    shed_events: IntCounter,
    reports: IntCounterVec,
    current_amps: Gauge,
    relay_shedding: IntGauge,
}

impl ControllerMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let iterations = IntCounter::with_opts(Opts::new(
            "shedtether_iterations_total",
            "Completed control loop iterations",
        ))?;
        registry.register(Box::new(iterations.clone()))?;

        let shed_events = IntCounter::with_opts(Opts::new(
            "shedtether_shed_events_total",
            "Iterations where the reading exceeded the threshold and the relay was tripped",
        ))?;
        registry.register(Box::new(shed_events.clone()))?;

        let reports = IntCounterVec::new(
            Opts::new(
                "shedtether_reports_total",
                "Status reports pushed to the cloud endpoint by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(reports.clone()))?;

        let current_amps = Gauge::with_opts(Opts::new(
            "shedtether_current_amps",
            "Most recent current reading in amps",
        ))?;
        registry.register(Box::new(current_amps.clone()))?;

        let relay_shedding = IntGauge::with_opts(Opts::new(
            "shedtether_relay_shedding",
            "Indicator (0/1) whether the last iteration shed load",
        ))?;
        registry.register(Box::new(relay_shedding.clone()))?;

        Ok(Self {
            iterations,
            shed_events,
            reports,
            current_amps,
            relay_shedding,
        })
    }

    pub fn observe_reading(&self, amps: f64, shedding: bool) {
        self.iterations.inc();
        self.current_amps.set(amps);
        self.relay_shedding.set(if shedding { 1 } else { 0 });
        if shedding {
            self.shed_events.inc();
        }
    }

    pub fn record_report(&self, outcome: ReportOutcome) {
        self.reports.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.get()
    }

    pub fn shed_events(&self) -> u64 {
        self.shed_events.get()
    }

    pub fn reports(&self, outcome: ReportOutcome) -> u64 {
        self.reports.with_label_values(&[outcome.as_str()]).get()
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts_total: IntCounter,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "shedtetherd_starts_total",
            "Total number of times the daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "shedtetherd_build_info",
                "Build metadata for the running daemon binary",
            ),
            &["version", "git_sha"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            starts_total,
            build_info,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn set_build_info(&self, version: &str, git_sha: &str) {
        self.build_info.with_label_values(&[version, git_sha]).set(1.0);
    }
}

pub use prometheus;
