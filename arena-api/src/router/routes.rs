use crate::app::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::chat::{chat_completions, list_models};
use super::clients::{
    client_heartbeat, get_client, list_clients, register_client, update_client_status,
};
use super::health::{gateway_health, run_health_check};
use super::stats::routing_stats;

/// 创建应用路由
pub fn create_app_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(gateway_health))
        .route("/health/check", post(run_health_check))
        .route("/stats", get(routing_stats))
        .route("/clients/register", post(register_client))
        .route("/clients", get(list_clients))
        .route("/clients/{id}", get(get_client))
        .route("/clients/{id}/status", post(update_client_status))
        .route("/clients/{id}/heartbeat", post(client_heartbeat))
        .nest("/v1", create_v1_routes())
        .layer(TraceLayer::new_for_http())
}

/// 创建 v1 API 路由（OpenAI兼容面）
fn create_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/models", get(list_models))
}

/// 首页处理器
pub async fn index() -> &'static str {
    "Arena Gateway - OpenAI Compatible Fleet Router"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{create_app, AppState};
    use arena_core::{FleetSettings, GatewayConfig};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;

    async fn test_server(api_key: &str) -> TestServer {
        let mut config = GatewayConfig {
            fleet: FleetSettings {
                storage_path: String::new(),
                ..Default::default()
            },
            ..Default::default()
        };
        config.server.api_key = api_key.to_string();

        let state = AppState::with_config(config).await.unwrap();
        TestServer::new(create_app(state)).unwrap()
    }

    #[tokio::test]
    async fn test_index() {
        let server = test_server("").await;
        let response = server.get("/").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(
            response.text(),
            "Arena Gateway - OpenAI Compatible Fleet Router"
        );
    }

    #[tokio::test]
    async fn test_register_list_get_flow() {
        let server = test_server("").await;

        let response = server
            .post("/clients/register")
            .json(&json!({
                "name": "alpha",
                "endpoint": "http://127.0.0.1:9100/api",
                "capabilities": ["chat"],
            }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let registration: serde_json::Value = response.json();
        let id = registration["id"].as_str().unwrap().to_string();
        assert_eq!(registration["secret"].as_str().unwrap().len(), 48);

        let response = server.get("/clients").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let listing: serde_json::Value = response.json();
        assert_eq!(listing["total"], 1);
        assert_eq!(listing["clients"][0]["id"], id.as_str());
        assert_eq!(listing["clients"][0]["status"], "pending");
        // 凭证只在注册响应中出现一次
        assert!(listing["clients"][0].get("secret").is_none());

        let response = server.get(&format!("/clients/{id}")).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let detail: serde_json::Value = response.json();
        assert_eq!(detail["endpoint"], "http://127.0.0.1:9100/api");
        assert_eq!(detail["stats"]["totalRequests"], 0);
    }

    #[tokio::test]
    async fn test_register_validation_error() {
        let server = test_server("").await;
        let response = server
            .post("/clients/register")
            .json(&json!({"name": "", "endpoint": "nonsense"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_client_is_404() {
        let server = test_server("").await;
        let response = server.get("/clients/no-such-id").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "CLIENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_chat_with_empty_fleet_is_503() {
        let server = test_server("").await;
        let response = server
            .post("/v1/chat/completions")
            .json(&json!({"model": "arena", "messages": []}))
            .await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "NO_CLIENTS_AVAILABLE");
        assert_eq!(body["error"]["details"]["requiredCapabilities"][0], "chat");
    }

    #[tokio::test]
    async fn test_api_key_is_enforced_on_v1() {
        let server = test_server("gateway-key").await;

        let response = server
            .post("/v1/chat/completions")
            .json(&json!({"messages": []}))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

        let response = server
            .post("/v1/chat/completions")
            .authorization_bearer("wrong-key")
            .json(&json!({"messages": []}))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

        // 正确密钥通过认证，失败点后移到空fleet
        let response = server
            .post("/v1/chat/completions")
            .authorization_bearer("gateway-key")
            .json(&json!({"messages": []}))
            .await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_status_update_and_heartbeat() {
        let server = test_server("").await;

        let response = server
            .post("/clients/register")
            .json(&json!({"name": "alpha", "endpoint": "http://127.0.0.1:9100"}))
            .await;
        let registration: serde_json::Value = response.json();
        let id = registration["id"].as_str().unwrap().to_string();

        let response = server
            .post(&format!("/clients/{id}/status"))
            .json(&json!({"status": "active", "metadata": {"region": "eu"}}))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let detail: serde_json::Value = response.json();
        assert_eq!(detail["status"], "active");
        assert_eq!(detail["metadata"]["region"], "eu");

        let response = server.post(&format!("/clients/{id}/heartbeat")).await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let server = test_server("").await;
        let response = server.get("/stats").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let stats: serde_json::Value = response.json();
        assert_eq!(stats["totalWorkers"], 0);
        assert_eq!(stats["strategy"], "least_load");
    }

    #[tokio::test]
    async fn test_gateway_health() {
        let server = test_server("").await;
        let response = server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["totalWorkers"], 0);
    }
}
