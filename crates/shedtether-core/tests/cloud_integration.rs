//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "End-to-end control loop tests against an in-process endpoint."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use shedtether_common::config::{AppConfig, CloudConfig, DeviceConfig, SensorConfig};
use shedtether_core::{
    CloudClient, Delivery, DeliveryOutcome, MockCtClamp, RelayStatus, ScriptedSensor,
    ShedController, StubRelay,
};
use shedtether_metrics::{new_registry, ControllerMetrics, ReportOutcome};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use url::Url;

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(Option<String>, String)>>>,
}

impl Captured {
    fn len(&self) -> usize {
        self.requests.lock().len()
    }

    fn bodies(&self) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .map(|(_, body)| serde_json::from_str(body).unwrap())
            .collect()
    }
}

async fn ingest(
    State((captured, status)): State<(Captured, StatusCode)>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    captured.requests.lock().push((content_type, body));
    status
}

async fn spawn_endpoint(status: StatusCode) -> (SocketAddr, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/updateShedStats", post(ingest))
        .with_state((captured.clone(), status));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    (addr, captured)
}

fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn cloud_config(addr: SocketAddr) -> CloudConfig {
    CloudConfig {
        endpoint: Url::parse(&format!("http://{addr}/updateShedStats")).unwrap(),
        timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn reports_reach_endpoint_as_json() {
    let (addr, captured) = spawn_endpoint(StatusCode::OK).await;
    let relay = Arc::new(StubRelay::new());
    let controller = ShedController::new(
        DeviceConfig::default(),
        Box::new(ScriptedSensor::new(vec![12.4, 20.0, 14.5]).unwrap()),
        relay.clone(),
        Arc::new(CloudClient::from_config(&cloud_config(addr)).unwrap()),
    )
    .with_interval(Duration::from_millis(10))
    .with_max_iterations(3);
    let (_tx, rx) = broadcast::channel(1);

    assert_eq!(controller.run(rx).await, 3);
    assert_eq!(relay.trigger_count(), 1);

    let requests = captured.requests.lock().clone();
    assert_eq!(requests.len(), 3);
    for (content_type, _) in &requests {
        assert_eq!(content_type.as_deref(), Some("application/json"));
    }

    let bodies = captured.bodies();
    let statuses: Vec<&str> = bodies
        .iter()
        .map(|body| body["relay_status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["ON", "SHEDDING_LOAD", "ON"]);
    for body in &bodies {
        let object = body.as_object().unwrap();
        assert_eq!(object.len(), 4);
        assert_eq!(object["shed_id"], Value::from("SHED_802_NB"));
        assert_eq!(object["auth_token"], Value::from("PLACED_SECURE_TOKEN_2026"));
        assert!(object["current_amps"].is_f64());
    }
    assert_eq!(bodies[1]["current_amps"].as_f64(), Some(20.0));
}

#[tokio::test]
async fn unreachable_endpoint_does_not_stop_loop() {
    let interval = Duration::from_millis(50);
    let relay = Arc::new(StubRelay::new());
    let metrics = ControllerMetrics::new(new_registry()).unwrap();
    let controller = ShedController::new(
        DeviceConfig::default(),
        Box::new(MockCtClamp::new(20.0)),
        relay.clone(),
        Arc::new(CloudClient::from_config(&cloud_config(dead_addr())).unwrap()),
    )
    .with_interval(interval)
    .with_max_iterations(3)
    .with_metrics(metrics.clone());
    let (_tx, rx) = broadcast::channel(1);

    let started = Instant::now();
    assert_eq!(controller.run(rx).await, 3);
    assert!(started.elapsed() >= interval * 2);

    assert_eq!(relay.trigger_count(), 3);
    assert_eq!(metrics.iterations(), 3);
    assert_eq!(metrics.shed_events(), 3);
    assert_eq!(metrics.reports(ReportOutcome::Failed), 3);
    assert_eq!(metrics.reports(ReportOutcome::Accepted), 0);
}

#[tokio::test]
async fn failed_push_is_folded_into_outcome() {
    let controller = ShedController::new(
        DeviceConfig::default(),
        Box::new(MockCtClamp::new(12.4)),
        Arc::new(StubRelay::new()),
        Arc::new(CloudClient::from_config(&cloud_config(dead_addr())).unwrap()),
    );

    let outcome = controller.run_once().await.unwrap();
    assert_eq!(outcome.relay_status, RelayStatus::On);
    assert!(matches!(outcome.delivery, DeliveryOutcome::Failed(_)));
}

#[tokio::test]
async fn rejected_status_is_reported_not_raised() {
    let (addr, captured) = spawn_endpoint(StatusCode::SERVICE_UNAVAILABLE).await;
    let metrics = ControllerMetrics::new(new_registry()).unwrap();
    let controller = ShedController::new(
        DeviceConfig::default(),
        Box::new(MockCtClamp::new(12.4)),
        Arc::new(StubRelay::new()),
        Arc::new(CloudClient::from_config(&cloud_config(addr)).unwrap()),
    )
    .with_metrics(metrics.clone());

    let outcome = controller.run_once().await.unwrap();
    assert_eq!(
        outcome.delivery,
        DeliveryOutcome::Delivered(Delivery {
            status: 503,
            accepted: false
        })
    );
    assert_eq!(captured.len(), 1);
    assert_eq!(metrics.reports(ReportOutcome::Rejected), 1);
}

#[tokio::test]
async fn shutdown_stops_idle_loop() {
    let (addr, captured) = spawn_endpoint(StatusCode::OK).await;
    let controller = ShedController::new(
        DeviceConfig::default(),
        Box::new(MockCtClamp::new(12.4)),
        Arc::new(StubRelay::new()),
        Arc::new(CloudClient::from_config(&cloud_config(addr)).unwrap()),
    )
    .with_interval(Duration::from_secs(3600));
    let (tx, rx) = broadcast::channel(1);

    let task = tokio::spawn(async move { controller.run(rx).await });

    let deadline = Instant::now() + Duration::from_secs(5);
    while captured.len() == 0 {
        assert!(Instant::now() < deadline, "first report never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.send(()).unwrap();

    let iterations = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop did not stop")
        .unwrap();
    assert_eq!(iterations, 1);
}

#[tokio::test]
async fn controller_from_config_runs_end_to_end() {
    let (addr, captured) = spawn_endpoint(StatusCode::OK).await;
    let mut config = AppConfig::default();
    config.device.shed_id = "SHED_BENCH".into();
    config.sensor = SensorConfig::Scripted {
        readings: vec![14.4, 14.6],
    };
    config.cloud = cloud_config(addr);
    config.controller.interval = Duration::from_millis(5);
    config.controller.max_iterations = Some(2);
    config.validate().unwrap();

    let metrics = ControllerMetrics::new(new_registry()).unwrap();
    let controller = ShedController::from_config(&config)
        .unwrap()
        .with_metrics(metrics.clone());
    let (_tx, rx) = broadcast::channel(1);

    assert_eq!(controller.run(rx).await, 2);
    assert_eq!(metrics.reports(ReportOutcome::Accepted), 2);
    assert_eq!(metrics.shed_events(), 1);

    let bodies = captured.bodies();
    assert_eq!(bodies[0]["shed_id"], Value::from("SHED_BENCH"));
    assert_eq!(bodies[0]["relay_status"], Value::from("ON"));
    assert_eq!(bodies[1]["relay_status"], Value::from("SHEDDING_LOAD"));
}
