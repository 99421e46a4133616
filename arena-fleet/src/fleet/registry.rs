use super::store::{FleetStore, PersistedFleet};
use arena_core::{
    FleetSettings, GatewayError, HealthLevel, RateLimitConfig, Registration, RegistrationRequest,
    Worker, WorkerId, WorkerStats, WorkerStatus,
};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// worker与其统计的权威配对
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerEntry {
    pub worker: Worker,
    pub stats: WorkerStats,
}

/// worker注册表
///
/// fleet状态的唯一权威来源。所有读写经过内部的读写锁，
/// 变更在持有写锁期间落盘，调用返回后崩溃不会丢失该次更新。
/// 其他组件只拿快照，不得跨调用缓存。
pub struct WorkerRegistry {
    workers: RwLock<HashMap<WorkerId, WorkerEntry>>,
    store: Option<FleetStore>,
    settings: FleetSettings,
}

impl WorkerRegistry {
    pub fn new(settings: FleetSettings) -> Self {
        let store = if settings.storage_path.is_empty() {
            None
        } else {
            Some(FleetStore::new(settings.storage_path.clone()))
        };

        Self {
            workers: RwLock::new(HashMap::new()),
            store,
            settings,
        }
    }

    /// 从持久化存储恢复fleet状态
    pub async fn initialize(&self) -> Result<(), GatewayError> {
        let Some(store) = &self.store else {
            info!("Worker registry running in-memory only");
            return Ok(());
        };

        let fleet = store.load().await?;
        let mut workers = self.workers.write().await;
        *workers = fleet.workers;
        info!("Worker registry initialized with {} workers", workers.len());
        Ok(())
    }

    /// 注册新worker，签发id与凭证
    ///
    /// 新worker以`pending`状态入册，统计清零，等待首次健康检查转为active。
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<Registration, GatewayError> {
        request.validate()?;

        let per_minute = request
            .rate_limit
            .unwrap_or(self.settings.default_rate_limit_per_minute);
        let per_day = request
            .daily_limit
            .unwrap_or(self.settings.default_rate_limit_per_day);
        if per_minute == 0 || per_day == 0 {
            return Err(GatewayError::Validation(
                "rate limits must be greater than zero".to_string(),
            ));
        }

        let capabilities: BTreeSet<String> = match request.capabilities {
            Some(caps) if !caps.is_empty() => caps.into_iter().collect(),
            _ => BTreeSet::from(["chat".to_string()]),
        };

        let id = uuid::Uuid::new_v4().to_string();
        let secret = generate_secret();
        let now = Utc::now();

        let worker = Worker {
            id: id.clone(),
            secret: secret.clone(),
            name: request.name.trim().to_string(),
            endpoint: request.endpoint.clone(),
            capabilities,
            status: WorkerStatus::Pending,
            rate_limit: RateLimitConfig {
                per_minute,
                per_day,
            },
            last_seen: now,
            registered_at: now,
            metadata: request.metadata.unwrap_or_default(),
        };

        let mut workers = self.workers.write().await;
        workers.insert(
            id.clone(),
            WorkerEntry {
                worker,
                stats: WorkerStats::default(),
            },
        );
        self.persist(&workers).await?;

        info!(
            "Registered worker '{}' ({}) at {}",
            request.name, id, request.endpoint
        );
        Ok(Registration { id, secret })
    }

    pub async fn get(&self, id: &str) -> Option<WorkerEntry> {
        self.workers.read().await.get(id).cloned()
    }

    pub async fn list_all(&self) -> Vec<WorkerEntry> {
        self.workers.read().await.values().cloned().collect()
    }

    /// 强制设置状态并合并metadata
    pub async fn update_status(
        &self,
        id: &str,
        status: WorkerStatus,
        metadata_patch: HashMap<String, serde_json::Value>,
    ) -> Result<(), GatewayError> {
        let mut workers = self.workers.write().await;
        let entry = workers
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;

        let previous = entry.worker.status;
        entry.worker.status = status;
        entry.worker.metadata.extend(metadata_patch);
        self.persist(&workers).await?;

        if previous != status {
            info!(
                "Worker {} status: {} -> {}",
                id,
                previous.as_str(),
                status.as_str()
            );
        }
        Ok(())
    }

    /// 记录一次转发结果
    ///
    /// 更新计数器、运行均值与派生健康等级；成功时同步刷新`last_seen`。
    pub async fn record_outcome(
        &self,
        id: &str,
        success: bool,
        response_time_ms: f64,
    ) -> Result<(), GatewayError> {
        let now = Utc::now();
        let mut workers = self.workers.write().await;
        let entry = workers
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;

        entry.stats.record(success, response_time_ms, now);
        if success {
            entry.worker.last_seen = now;
        }
        debug!(
            "Recorded outcome for worker {}: success={} time={:.1}ms avg={:.1}ms health={}",
            id,
            success,
            response_time_ms,
            entry.stats.average_response_time_ms,
            entry.stats.health_status.as_str()
        );
        self.persist(&workers).await
    }

    /// 心跳：只刷新`last_seen`，不动统计
    pub async fn touch(&self, id: &str) -> Result<(), GatewayError> {
        let mut workers = self.workers.write().await;
        let entry = workers
            .get_mut(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;

        entry.worker.last_seen = Utc::now();
        self.persist(&workers).await
    }

    /// 可路由的worker集合
    ///
    /// 过滤条件：权威状态为active、统计健康等级非unhealthy、
    /// 能力集覆盖全部要求。
    pub async fn get_available(&self, required_capabilities: &[String]) -> Vec<WorkerEntry> {
        self.workers
            .read()
            .await
            .values()
            .filter(|entry| {
                entry.worker.status == WorkerStatus::Active
                    && entry.stats.health_status != HealthLevel::Unhealthy
                    && required_capabilities
                        .iter()
                        .all(|cap| entry.worker.capabilities.contains(cap))
            })
            .cloned()
            .collect()
    }

    async fn persist(&self, workers: &HashMap<WorkerId, WorkerEntry>) -> Result<(), GatewayError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store
            .save(&PersistedFleet {
                workers: workers.clone(),
            })
            .await
    }
}

/// 48个十六进制字符的随机凭证
fn generate_secret() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
