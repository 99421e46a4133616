use arena_core::GatewayError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info, warn};

/// 把网关错误映射为结构化HTTP响应
///
/// 响应体形如 `{"error": {"message", "code", "status", "details"}}`，
/// `code`是稳定的机器可读错误码。预期内的失败只记info日志。
pub fn error_response(e: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if e.is_expected() {
        info!("Request rejected: {} [{}]", e, e.error_code());
    } else if matches!(e, GatewayError::Forward(_)) {
        warn!("Upstream failure: {} [{}]", e, e.error_code());
    } else {
        error!("Gateway failure: {} [{}]", e, e.error_code());
    }

    let mut body = json!({
        "error": {
            "message": e.to_string(),
            "code": e.error_code(),
            "status": status.as_u16(),
        }
    });
    if let Some(details) = error_details(e) {
        body["error"]["details"] = details;
    }

    (status, Json(body)).into_response()
}

fn error_details(e: &GatewayError) -> Option<Value> {
    match e {
        GatewayError::RateLimited {
            worker_id,
            reason,
            limit,
            current,
            reset_after_secs,
        } => Some(json!({
            "workerId": worker_id,
            "reason": reason.as_code(),
            "limit": limit,
            "current": current,
            "resetAfterSeconds": reset_after_secs,
        })),
        GatewayError::NoEligibleWorkers { required } => Some(json!({
            "requiredCapabilities": required,
        })),
        GatewayError::Forward(fe) => fe
            .upstream_status()
            .map(|status| json!({ "upstreamStatus": status })),
        _ => None,
    }
}
