use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Local;
use downwatch_core::{Collector, ReportSink, ReportTable};
use serde_json::Value;
use tower::ServiceExt;

use crate::pipeline::Pipeline;
use crate::pipeline_tests::{sensor, server, MockResponse, MockSource, RecordingSink};
use crate::server::{build_router, AppState};

fn app(source: MockSource, sink: Option<Arc<RecordingSink>>) -> Router {
    let collector = Collector::new(
        source,
        vec![server("prtg-1", "Group 1"), server("prtg-2", "Group 2")],
        Duration::from_secs(5),
    );
    let sink = sink.map(|s| s as Arc<dyn ReportSink>);
    build_router(AppState::new(Pipeline::new(collector, sink, None, 15)))
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body = serde_json::from_slice(&bytes).expect("json body");
    (status, body)
}

fn days_ago(days: i64) -> String {
    (Local::now().naive_local() - chrono::Duration::days(days))
        .format("%m/%d/%Y %I:%M:%S %p")
        .to_string()
}

#[tokio::test]
async fn health_reports_service_identity() {
    let (status, body) = send(app(MockSource::new(vec![]), None), "GET", "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["service"].as_str().is_some());
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn status_without_sink_counts_servers() {
    let (status, body) = send(app(MockSource::new(vec![]), None), "GET", "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "operational");
    assert_eq!(body["sink_enabled"], false);
    assert_eq!(body["prtg_servers_configured"], 2);
}

#[tokio::test]
async fn status_reports_unreachable_sink() {
    let sink = Arc::new(RecordingSink {
        ping_fails: true,
        ..RecordingSink::default()
    });

    let (status, body) = send(app(MockSource::new(vec![]), Some(sink)), "GET", "/status").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["supabase_connected"], false);
    assert!(body["error"].as_str().unwrap_or_default().contains("connection refused"));
}

#[tokio::test]
async fn run_report_returns_counts() {
    // Arrange
    let source = MockSource::new(vec![
        (
            "prtg-1",
            MockResponse::Sensors(vec![
                sensor("site-a", &days_ago(10)),
                sensor("site-b", "unknown"),
            ]),
        ),
        ("prtg-2", MockResponse::Fail),
    ]);
    let sink = Arc::new(RecordingSink::default());

    // Act
    let (status, body) = send(app(source, Some(sink.clone())), "POST", "/run-report").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["full_report_count"], 2);
    assert_eq!(body["critical_report_count"], 1);
    assert_eq!(body["failed_servers"][0], "prtg-2");

    let inserted = sink.inserted.lock().expect("sink lock");
    assert_eq!(inserted.len(), 2);
    assert_eq!(inserted[1].0, ReportTable::Critical);
    assert_eq!(inserted[1].1[0].downtime_days, 10);
}

#[tokio::test]
async fn run_report_surfaces_sink_errors() {
    let source = MockSource::new(vec![(
        "prtg-1",
        MockResponse::Sensors(vec![sensor("site-a", &days_ago(2))]),
    )]);
    let sink = Arc::new(RecordingSink {
        fail_on: Some(ReportTable::Critical),
        ..RecordingSink::default()
    });

    let (status, body) = send(app(source, Some(sink)), "POST", "/run-report").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap_or_default().contains("critical_report_logs"));
}

#[tokio::test]
async fn overlapping_run_is_rejected() {
    // Arrange
    let source = MockSource::new(vec![("prtg-1", MockResponse::Sensors(vec![]))])
        .with_delay(Duration::from_millis(300));
    let router = app(source, None);
    let first = tokio::spawn(send(router.clone(), "POST", "/run-report"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Act
    let (status, body) = send(router, "POST", "/run-report").await;

    // Assert
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    let (first_status, _) = first.await.expect("first run");
    assert_eq!(first_status, StatusCode::OK);
}
