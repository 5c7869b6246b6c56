use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use downwatch_core::SensorSource;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::pipeline::Pipeline;

pub const SERVICE_NAME: &str = "downwatch PRTG downtime reporter";

pub struct AppState<S: SensorSource> {
    pipeline: Arc<Pipeline<S>>,
    run_guard: Arc<Mutex<()>>,
}

impl<S: SensorSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            run_guard: Arc::clone(&self.run_guard),
        }
    }
}

impl<S: SensorSource> AppState<S> {
    pub fn new(pipeline: Pipeline<S>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            run_guard: Arc::new(Mutex::new(())),
        }
    }
}

pub fn build_router<S: SensorSource + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/status", get(status::<S>))
        .route("/run-report", post(run_report::<S>))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": timestamp(),
    }))
}

async fn status<S: SensorSource + 'static>(State(app): State<AppState<S>>) -> (StatusCode, Json<Value>) {
    let servers = app.pipeline.server_count();
    let Some(sink) = app.pipeline.sink() else {
        return (
            StatusCode::OK,
            Json(json!({
                "status": "operational",
                "sink_enabled": false,
                "supabase_connected": false,
                "prtg_servers_configured": servers,
                "timestamp": timestamp(),
            })),
        );
    };

    match sink.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "operational",
                "sink_enabled": true,
                "supabase_connected": true,
                "prtg_servers_configured": servers,
                "timestamp": timestamp(),
            })),
        ),
        Err(err) => {
            warn!(error=%err, "sink connectivity check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "sink_enabled": true,
                    "supabase_connected": false,
                    "prtg_servers_configured": servers,
                    "error": err.to_string(),
                    "timestamp": timestamp(),
                })),
            )
        }
    }
}

async fn run_report<S: SensorSource + 'static>(State(app): State<AppState<S>>) -> (StatusCode, Json<Value>) {
    let Ok(_running) = app.run_guard.try_lock() else {
        warn!("report run requested while another is in progress");
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "message": "report run already in progress",
                "timestamp": timestamp(),
            })),
        );
    };

    info!("report run requested");
    match app.pipeline.run().await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Reports generated successfully",
                "full_report_count": report.stats.total_devices,
                "critical_report_count": report.stats.critical_devices,
                "average_downtime_days": report.stats.average_downtime_days,
                "failed_servers": report.failed_servers,
                "timestamp": report.finished_at.to_rfc3339(),
            })),
        ),
        Err(err) => {
            error!(error=%err, "report run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": err.to_string(),
                    "timestamp": timestamp(),
                })),
            )
        }
    }
}
