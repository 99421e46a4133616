use crate::app::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// fleet聚合路由统计
pub async fn routing_stats(State(state): State<AppState>) -> Response {
    Json(state.fleet.get_routing_stats().await).into_response()
}
