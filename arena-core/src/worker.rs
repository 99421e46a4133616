use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// worker的唯一标识（注册时生成的UUID）
pub type WorkerId = String;

/// worker生命周期状态
///
/// 这是权威状态，只由健康检查或管理员操作改变；
/// 与统计派生的[`HealthLevel`]相互独立。
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// 已注册，尚未通过首次健康检查
    Pending,
    /// 健康检查通过，可以接收流量
    Active,
    /// 健康检查失败
    Unhealthy,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Pending => "pending",
            WorkerStatus::Active => "active",
            WorkerStatus::Unhealthy => "unhealthy",
        }
    }
}

/// 由成功率派生的统计健康等级
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthLevel {
    /// 根据成功率计算健康等级
    ///
    /// 阈值：成功率 >= 0.95 为 healthy，>= 0.80 为 degraded，否则为 unhealthy。
    pub fn from_success_ratio(ratio: f64) -> Self {
        if ratio >= 0.95 {
            HealthLevel::Healthy
        } else if ratio >= 0.80 {
            HealthLevel::Degraded
        } else {
            HealthLevel::Unhealthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Healthy => "healthy",
            HealthLevel::Degraded => "degraded",
            HealthLevel::Unhealthy => "unhealthy",
        }
    }
}

/// 每个worker的请求配额上限
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub per_day: u32,
}

/// 已注册的后端worker
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Worker {
    pub id: WorkerId,
    /// 注册时签发的凭证，转发请求时作为Bearer使用；注册响应之后不再对外展示
    pub secret: String,
    pub name: String,
    /// worker HTTP API 的完整URL
    pub endpoint: String,
    /// worker声明的能力集合，如 "chat"、"models"、"images"
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    pub status: WorkerStatus,
    pub rate_limit: RateLimitConfig,
    /// 最近一次成功联系（注册、心跳或成功转发）
    pub last_seen: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    /// 健康检查与管理操作合并进来的附加信息
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// worker的累计请求统计，与[`Worker`]一一对应
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct WorkerStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// 增量维护的平均响应时间
    pub average_response_time_ms: f64,
    pub last_request_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub health_status: HealthLevel,
}

impl WorkerStats {
    /// 成功率；无请求时视为1.0，避免新worker被判为不健康
    pub fn success_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failed_requests as f64 / (self.total_requests.max(1)) as f64
    }

    /// 记录一次已完成的请求
    ///
    /// 计数器递增后通过 `avg' = (avg*(n-1)+sample)/n` 更新运行均值，
    /// 并根据新的成功率重新派生健康等级。不变量：
    /// `total_requests == successful_requests + failed_requests`。
    pub fn record(&mut self, success: bool, response_time_ms: f64, now: DateTime<Utc>) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        let n = self.total_requests as f64;
        self.average_response_time_ms =
            (self.average_response_time_ms * (n - 1.0) + response_time_ms) / n;
        self.last_request_at = Some(now);
        self.health_status = HealthLevel::from_success_ratio(self.success_ratio());
    }
}

/// 注册请求描述符
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RegistrationRequest {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    /// 每分钟配额；缺省时使用网关默认值
    #[serde(default)]
    pub rate_limit: Option<u32>,
    /// 每天配额；缺省时使用网关默认值
    #[serde(default)]
    pub daily_limit: Option<u32>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl RegistrationRequest {
    /// 校验注册入参：名称非空、endpoint为合法的http(s) URL
    pub fn validate(&self) -> Result<(), crate::error::GatewayError> {
        if self.name.trim().is_empty() {
            return Err(crate::error::GatewayError::Validation(
                "worker name must not be empty".to_string(),
            ));
        }
        let url = reqwest::Url::parse(&self.endpoint).map_err(|e| {
            crate::error::GatewayError::Validation(format!(
                "invalid endpoint URL '{}': {}",
                self.endpoint, e
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(crate::error::GatewayError::Validation(format!(
                "endpoint must be http or https, got '{}'",
                url.scheme()
            )));
        }
        Ok(())
    }
}

/// 注册结果：签发的凭证只在这里出现一次
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Registration {
    pub id: WorkerId,
    pub secret: String,
}
