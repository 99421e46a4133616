use crate::router::routes::create_app_router;
use arena_core::config::loader::{get_config_path, load_config};
use arena_core::{Forwarder, GatewayConfig};
use arena_fleet::FleetService;
use arena_relay::{HttpForwarder, Router as RelayRouter};

use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RelayRouter>,
    pub fleet: Arc<FleetService>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    /// 从默认配置路径创建应用状态
    pub async fn new() -> Result<Self> {
        let config = load_config()?;
        info!(
            "Configuration loaded successfully from: {}",
            get_config_path()
        );
        Self::with_config(config).await
    }

    /// 从已有配置创建应用状态并启动fleet服务
    pub async fn with_config(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        let forwarder: Arc<dyn Forwarder> = Arc::new(HttpForwarder::new(&config.forward)?);
        let fleet = Arc::new(FleetService::new(config.fleet.clone(), forwarder.clone()));
        fleet.start().await?;
        info!("Fleet service started");

        let router = Arc::new(RelayRouter::new(
            fleet.clone(),
            forwarder,
            config.forward.clone(),
        ));

        Ok(Self {
            router,
            fleet,
            config: Arc::new(config),
        })
    }

    /// 停止应用
    pub async fn shutdown(&self) {
        info!("Shutting down application...");
        self.fleet.stop().await;
        info!("Application shutdown complete");
    }
}

/// 创建应用路由
pub fn create_app(state: AppState) -> Router {
    create_app_router().with_state(state)
}

/// 启动应用服务器
pub async fn start_server() -> Result<()> {
    // 日志级别完全由RUST_LOG环境变量控制
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting Arena Gateway server...");
    info!("Configuration file: {}", get_config_path());

    let app_state = match AppState::new().await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            return Err(e);
        }
    };

    let app = create_app(app_state.clone());

    let bind_addr = app_state.config.server.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("Server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /                        - API information");
    info!("  GET  /health                  - Gateway health summary");
    info!("  POST /health/check            - Probe all workers now");
    info!("  GET  /stats                   - Fleet routing statistics");
    info!("  POST /clients/register        - Register a backend worker");
    info!("  GET  /clients                 - List registered workers");
    info!("  GET  /clients/{{id}}            - Worker detail");
    info!("  POST /clients/{{id}}/status     - Force worker status");
    info!("  POST /clients/{{id}}/heartbeat  - Worker heartbeat");
    info!("  POST /v1/chat/completions     - Chat completions (OpenAI compatible)");
    info!("  GET  /v1/models               - List models (OpenAI compatible)");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
        }
        info!("Shutdown signal received");
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

    if let Err(e) = server.await {
        error!("Server error: {}", e);
        app_state.shutdown().await;
        return Err(e.into());
    }

    app_state.shutdown().await;
    Ok(())
}
