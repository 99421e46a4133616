use anyhow::Result;
use serde::{Deserialize, Serialize};

/// 网关全局配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub fleet: FleetSettings,
    #[serde(default)]
    pub forward: ForwardSettings,
}

/// HTTP服务器配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// 网关自身的API密钥；为空时不校验调用方
    #[serde(default)]
    pub api_key: String,
}

/// 客户端集群（fleet）配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FleetSettings {
    #[serde(default)]
    pub strategy: LoadBalanceStrategy,
    /// 持久化文件路径；为空时仅保存在内存中
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    #[serde(default = "default_rate_limit_per_minute")]
    pub default_rate_limit_per_minute: u32,
    #[serde(default = "default_rate_limit_per_day")]
    pub default_rate_limit_per_day: u32,
    /// 无历史数据的worker参与打分时使用的基准响应时间
    #[serde(default = "default_baseline_response_ms")]
    pub baseline_response_ms: f64,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
}

/// 请求转发配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ForwardSettings {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// 可选的上游bridge直通地址；为空时禁用
    #[serde(default)]
    pub fallback_bridge: String,
    #[serde(default = "default_bridge_retry_attempts")]
    pub bridge_retry_attempts: u32,
    #[serde(default = "default_bridge_retry_initial_ms")]
    pub bridge_retry_initial_ms: u64,
}

/// 负载均衡策略
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    /// 按负载评分选择最低者（默认）
    #[default]
    LeastLoad,
    /// 轮询
    RoundRobin,
    /// 均匀随机
    Random,
}

impl LoadBalanceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalanceStrategy::LeastLoad => "least_load",
            LoadBalanceStrategy::RoundRobin => "round_robin",
            LoadBalanceStrategy::Random => "random",
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: String::new(),
        }
    }
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            strategy: LoadBalanceStrategy::default(),
            storage_path: default_storage_path(),
            default_rate_limit_per_minute: default_rate_limit_per_minute(),
            default_rate_limit_per_day: default_rate_limit_per_day(),
            baseline_response_ms: default_baseline_response_ms(),
            health_check_interval_seconds: default_health_check_interval(),
        }
    }
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            fallback_bridge: String::new(),
            bridge_retry_attempts: default_bridge_retry_attempts(),
            bridge_retry_initial_ms: default_bridge_retry_initial_ms(),
        }
    }
}

impl GatewayConfig {
    /// 校验配置的合法性
    pub fn validate(&self) -> Result<()> {
        if self.fleet.default_rate_limit_per_minute == 0 {
            anyhow::bail!("fleet.default_rate_limit_per_minute must be greater than zero");
        }
        if self.fleet.default_rate_limit_per_day == 0 {
            anyhow::bail!("fleet.default_rate_limit_per_day must be greater than zero");
        }
        if self.fleet.baseline_response_ms <= 0.0 {
            anyhow::bail!("fleet.baseline_response_ms must be positive");
        }
        if self.forward.request_timeout_seconds == 0 {
            anyhow::bail!("forward.request_timeout_seconds must be greater than zero");
        }
        if !self.forward.fallback_bridge.is_empty() {
            reqwest::Url::parse(&self.forward.fallback_bridge).map_err(|e| {
                anyhow::anyhow!(
                    "forward.fallback_bridge is not a valid URL '{}': {}",
                    self.forward.fallback_bridge,
                    e
                )
            })?;
        }
        Ok(())
    }

    /// 是否启用上游bridge直通
    pub fn bridge_enabled(&self) -> bool {
        !self.forward.fallback_bridge.is_empty()
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_storage_path() -> String {
    "storage/fleet.json".to_string()
}

fn default_rate_limit_per_minute() -> u32 {
    10
}

fn default_rate_limit_per_day() -> u32 {
    1000
}

fn default_baseline_response_ms() -> f64 {
    1000.0
}

fn default_health_check_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_bridge_retry_attempts() -> u32 {
    3
}

fn default_bridge_retry_initial_ms() -> u64 {
    200
}
