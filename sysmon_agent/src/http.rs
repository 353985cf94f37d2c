//! HTTP surface: JSON-RPC on `POST /` and `POST /mcp`, plus the REST facade.

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::info;

use crate::error::{AgentError, Result};
use crate::rpc;
use crate::state::AppState;
use crate::tools;
use crate::types::{
    CpuInfo, DiskInfo, MemoryInfo, MonitoringStatus, NetworkInfo, ProcessInfo, SystemInfo,
    SystemMetrics,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .route("/mcp", post(rpc_handler))
        .route("/health", get(health))
        .route("/api/system/info", get(system_info))
        .route("/api/system/cpu", get(cpu_info))
        .route("/api/system/memory", get(memory_info))
        .route("/api/system/disks", get(disks))
        .route("/api/system/networks", get(networks))
        .route("/api/system/processes", get(processes))
        .route("/api/system/processes/:pid", get(process_by_pid))
        .route("/api/system/metrics", get(metrics))
        .route("/api/monitoring/start", post(start_monitoring))
        .route("/api/monitoring/stop", post(stop_monitoring))
        .route("/api/monitoring/status", get(monitoring_status))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();
    let resp = next.run(req).await;
    info!(
        %method,
        %path,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    resp
}

async fn rpc_handler(State(state): State<AppState>, body: Bytes) -> Response {
    match rpc::handle_message(&state, &body).await {
        Some(resp) => Json(resp).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

async fn system_info(State(state): State<AppState>) -> Result<Json<SystemInfo>> {
    Ok(Json(state.collector.collect_system().await?))
}

async fn cpu_info(State(state): State<AppState>) -> Result<Json<CpuInfo>> {
    Ok(Json(state.collector.collect_cpu().await?))
}

async fn memory_info(State(state): State<AppState>) -> Result<Json<MemoryInfo>> {
    Ok(Json(state.collector.collect_memory().await?))
}

async fn disks(State(state): State<AppState>) -> Result<Json<Vec<DiskInfo>>> {
    Ok(Json(state.collector.collect_disks().await?))
}

async fn networks(State(state): State<AppState>) -> Result<Json<Vec<NetworkInfo>>> {
    Ok(Json(state.collector.collect_networks().await?))
}

#[derive(Debug, Deserialize)]
struct ProcessQuery {
    limit: Option<String>,
}

async fn processes(
    State(state): State<AppState>,
    Query(q): Query<ProcessQuery>,
) -> Result<Json<Vec<ProcessInfo>>> {
    let limit = match q.limit.as_deref() {
        None => None,
        Some(raw) => {
            let n = raw
                .parse::<u64>()
                .map_err(|_| AgentError::InvalidParams("limit must be a positive integer".into()))?;
            Some(tools::check_limit(n)?)
        }
    };
    let mut procs = state.collector.collect_processes().await?;
    if let Some(n) = limit {
        procs.truncate(n);
    }
    Ok(Json(procs))
}

async fn process_by_pid(
    State(state): State<AppState>,
    Path(pid): Path<String>,
) -> Result<Json<ProcessInfo>> {
    let pid = pid
        .parse::<u32>()
        .map_err(|_| AgentError::InvalidParams(format!("invalid pid: {pid}")))?;
    Ok(Json(state.collector.collect_process(pid).await?))
}

async fn metrics(State(state): State<AppState>) -> Result<Json<SystemMetrics>> {
    Ok(Json(state.collector.collect_metrics().await?))
}

async fn start_monitoring(State(state): State<AppState>) -> Result<Json<MonitoringStatus>> {
    Ok(Json(state.monitor.start().await?))
}

async fn stop_monitoring(State(state): State<AppState>) -> Result<Json<MonitoringStatus>> {
    Ok(Json(state.monitor.stop().await?))
}

async fn monitoring_status(State(state): State<AppState>) -> Json<MonitoringStatus> {
    Json(state.monitor.status().await)
}
