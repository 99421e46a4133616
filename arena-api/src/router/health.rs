use crate::app::AppState;
use arena_core::WorkerStatus;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// 网关自身的健康摘要
pub async fn gateway_health(State(state): State<AppState>) -> Response {
    let entries = state.fleet.registry().list_all().await;
    let active = entries
        .iter()
        .filter(|e| e.worker.status == WorkerStatus::Active)
        .count();

    Json(json!({
        "status": "ok",
        "totalWorkers": entries.len(),
        "activeWorkers": active,
    }))
    .into_response()
}

/// 立刻探测所有worker并返回逐个结果
pub async fn run_health_check(State(state): State<AppState>) -> Response {
    let results = state.fleet.health_checker().check_all().await;
    Json(json!({ "results": results })).into_response()
}
