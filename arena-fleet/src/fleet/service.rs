use super::health::HealthChecker;
use super::rate_limit::RateLimiter;
use super::registry::WorkerRegistry;
use super::scorer::LoadScorer;
use super::selector::WorkerSelector;
use arena_core::{FleetSettings, Forwarder, GatewayError, WorkerStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

/// 全fleet聚合统计，按需计算
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingStats {
    pub total_workers: usize,
    pub active_workers: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub strategy: String,
}

/// fleet服务
///
/// 把注册表、限流器、选择器和健康检查器组合成统一入口，
/// 并负责周期性健康检查循环的启停。
pub struct FleetService {
    registry: Arc<WorkerRegistry>,
    rate_limiter: Arc<RateLimiter>,
    selector: Arc<WorkerSelector>,
    health_checker: Arc<HealthChecker>,
    health_interval: Duration,
    is_running: Arc<RwLock<bool>>,
}

impl FleetService {
    pub fn new(settings: FleetSettings, forwarder: Arc<dyn Forwarder>) -> Self {
        let registry = Arc::new(WorkerRegistry::new(settings.clone()));
        let rate_limiter = Arc::new(RateLimiter::new());
        let selector = Arc::new(WorkerSelector::new(
            settings.strategy,
            LoadScorer::new(settings.baseline_response_ms),
        ));
        let health_checker = Arc::new(HealthChecker::new(registry.clone(), forwarder));

        Self {
            registry,
            rate_limiter,
            selector,
            health_checker,
            health_interval: Duration::from_secs(settings.health_check_interval_seconds),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// 启动fleet服务：恢复持久化状态并启动健康检查循环
    pub async fn start(&self) -> Result<(), GatewayError> {
        {
            let mut running = self.is_running.write().await;
            if *running {
                return Ok(());
            }
            *running = true;
        }

        info!("Starting fleet service");
        self.registry.initialize().await?;

        let health_checker = self.health_checker.clone();
        let is_running = self.is_running.clone();
        let interval = self.health_interval;

        tokio::spawn(async move {
            while *is_running.read().await {
                let results = health_checker.check_all().await;
                if results.is_empty() {
                    info!("Health check loop: no workers registered yet");
                }
                tokio::time::sleep(interval).await;
            }
            info!("Health check loop stopped");
        });

        info!(
            "Fleet service started (health check interval: {:?})",
            self.health_interval
        );
        Ok(())
    }

    /// 停止服务；健康检查循环在下一轮退出
    pub async fn stop(&self) {
        let mut running = self.is_running.write().await;
        *running = false;
        info!("Fleet service stopped");
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        self.registry.clone()
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.rate_limiter.clone()
    }

    pub fn selector(&self) -> Arc<WorkerSelector> {
        self.selector.clone()
    }

    pub fn health_checker(&self) -> Arc<HealthChecker> {
        self.health_checker.clone()
    }

    /// 跨全部worker的只读统计汇总
    pub async fn get_routing_stats(&self) -> RoutingStats {
        let entries = self.registry.list_all().await;

        let total_workers = entries.len();
        let active_workers = entries
            .iter()
            .filter(|e| e.worker.status == WorkerStatus::Active)
            .count();
        let total_requests: u64 = entries.iter().map(|e| e.stats.total_requests).sum();
        let successful_requests: u64 = entries.iter().map(|e| e.stats.successful_requests).sum();
        let failed_requests: u64 = entries.iter().map(|e| e.stats.failed_requests).sum();

        let denominator = total_requests.max(1) as f64;
        RoutingStats {
            total_workers,
            active_workers,
            total_requests,
            successful_requests,
            failed_requests,
            success_rate: successful_requests as f64 / denominator,
            failure_rate: failed_requests as f64 / denominator,
            strategy: self.selector.strategy().as_str().to_string(),
        }
    }

    /// 记录转发结果；持久化失败只记日志，不盖过业务结果
    pub async fn record_outcome_logged(&self, worker_id: &str, success: bool, elapsed_ms: f64) {
        if let Err(e) = self
            .registry
            .record_outcome(worker_id, success, elapsed_ms)
            .await
        {
            error!(
                "Failed to record outcome for worker {}: {} [{}]",
                worker_id,
                e,
                e.error_code()
            );
        }
    }
}
