use super::error::error_response;
use crate::app::AppState;
use arena_core::{RegistrationRequest, WorkerStatus};
use arena_fleet::WorkerEntry;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// 状态强制更新请求
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: WorkerStatus,
    #[serde(default)]
    pub metadata: Option<HashMap<String, Value>>,
}

/// 注册后端worker，返回签发的id与凭证（凭证仅此一次可见）
pub async fn register_client(
    State(state): State<AppState>,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    match state.fleet.registry().register(request).await {
        Ok(registration) => Json(registration).into_response(),
        Err(e) => error_response(&e),
    }
}

/// 列出全部worker（不含凭证）
pub async fn list_clients(State(state): State<AppState>) -> Response {
    let entries = state.fleet.registry().list_all().await;
    let clients: Vec<Value> = entries.iter().map(client_view).collect();
    Json(json!({
        "clients": clients,
        "total": clients.len(),
    }))
    .into_response()
}

/// 单个worker详情（不含凭证）
pub async fn get_client(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.fleet.registry().get(&id).await {
        Some(entry) => Json(client_view(&entry)).into_response(),
        None => error_response(&arena_core::GatewayError::NotFound(id)),
    }
}

/// 管理员强制设置worker状态并合并metadata
pub async fn update_client_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Response {
    let registry = state.fleet.registry();
    if let Err(e) = registry
        .update_status(&id, request.status, request.metadata.unwrap_or_default())
        .await
    {
        return error_response(&e);
    }
    match registry.get(&id).await {
        Some(entry) => Json(client_view(&entry)).into_response(),
        None => error_response(&arena_core::GatewayError::NotFound(id)),
    }
}

/// worker心跳：刷新last_seen
pub async fn client_heartbeat(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.fleet.registry().touch(&id).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// 对外的worker视图，凭证永不出现
fn client_view(entry: &WorkerEntry) -> Value {
    let worker = &entry.worker;
    let stats = &entry.stats;
    json!({
        "id": worker.id,
        "name": worker.name,
        "endpoint": worker.endpoint,
        "capabilities": worker.capabilities,
        "status": worker.status.as_str(),
        "rateLimit": {
            "perMinute": worker.rate_limit.per_minute,
            "perDay": worker.rate_limit.per_day,
        },
        "lastSeen": worker.last_seen,
        "registeredAt": worker.registered_at,
        "metadata": worker.metadata,
        "stats": {
            "totalRequests": stats.total_requests,
            "successfulRequests": stats.successful_requests,
            "failedRequests": stats.failed_requests,
            "averageResponseTimeMs": stats.average_response_time_ms,
            "lastRequestAt": stats.last_request_at,
            "healthStatus": stats.health_status.as_str(),
        },
    })
}
