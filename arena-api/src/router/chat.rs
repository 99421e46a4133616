use super::error::error_response;
use crate::app::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::TypedHeader;
use headers::authorization::Bearer;
use headers::Authorization;
use serde_json::{json, Value};
use tracing::debug;

/// V1 API: 聊天完成（OpenAI兼容）
///
/// `stream=true`时把选中worker的原始字节流按SSE直通给调用方，
/// 事件帧由worker产出，这里不重新分帧。
pub async fn chat_completions(
    State(state): State<AppState>,
    authorization: Option<TypedHeader<Authorization<Bearer>>>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(response) = check_api_key(&state, &authorization) {
        return response;
    }

    let streaming = body
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let required = vec!["chat".to_string()];

    if streaming {
        stream_completions(state, body, required).await
    } else {
        buffered_completions(state, body, required).await
    }
}

/// V1 API: 模型列表（OpenAI兼容），路由到具备models能力的worker
pub async fn list_models(
    State(state): State<AppState>,
    authorization: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    if let Some(response) = check_api_key(&state, &authorization) {
        return response;
    }

    let payload = json!({ "type": "models" });
    match state
        .router
        .route(payload, vec!["models".to_string()])
        .await
    {
        Ok(routed) => annotated_json_response(routed.data, &routed.worker_id, &routed.correlation_id),
        Err(e) => error_response(&e),
    }
}

async fn buffered_completions(
    state: AppState,
    body: Value,
    required: Vec<String>,
) -> Response {
    match state.router.route(body, required).await {
        Ok(routed) => {
            debug!(
                "Completed request via worker {} in {:.1}ms [{}]",
                routed.worker_id, routed.response_time_ms, routed.correlation_id
            );
            annotated_json_response(routed.data, &routed.worker_id, &routed.correlation_id)
        }
        Err(e) => error_response(&e),
    }
}

async fn stream_completions(
    state: AppState,
    body: Value,
    required: Vec<String>,
) -> Response {
    let routed = match state.router.stream_route(body, required).await {
        Ok(routed) => routed,
        Err(e) => return error_response(&e),
    };

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/event-stream")
        .header("Cache-Control", "no-cache")
        .header("X-Worker-Id", routed.worker_id.as_str())
        .header("X-Correlation-Id", routed.correlation_id.as_str());

    match builder.body(Body::from_stream(routed.stream)) {
        Ok(response) => response,
        Err(e) => error_response(&arena_core::GatewayError::Internal(format!(
            "failed to build streaming response: {e}"
        ))),
    }
}

fn annotated_json_response(data: Value, worker_id: &str, correlation_id: &str) -> Response {
    let mut response = Json(data).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = worker_id.parse() {
        headers.insert("X-Worker-Id", value);
    }
    if let Ok(value) = correlation_id.parse() {
        headers.insert("X-Correlation-Id", value);
    }
    response
}

/// 网关API密钥校验；密钥未配置时放行所有调用方
fn check_api_key(
    state: &AppState,
    authorization: &Option<TypedHeader<Authorization<Bearer>>>,
) -> Option<Response> {
    let expected = &state.config.server.api_key;
    if expected.is_empty() {
        return None;
    }

    let provided = authorization
        .as_ref()
        .map(|TypedHeader(auth)| auth.token());
    if provided == Some(expected.as_str()) {
        return None;
    }

    Some(
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": {
                    "message": "The provided API key is invalid",
                    "code": "INVALID_API_KEY",
                    "status": 401,
                }
            })),
        )
            .into_response(),
    )
}
