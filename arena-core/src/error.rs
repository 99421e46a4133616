use crate::forward::ForwardError;
use crate::worker::WorkerId;

/// 限流拒绝原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    PerMinute,
    PerDay,
}

impl RateLimitReason {
    /// 稳定的机器可读原因码
    pub fn as_code(&self) -> &'static str {
        match self {
            RateLimitReason::PerMinute => "RATE_LIMIT_PER_MINUTE",
            RateLimitReason::PerDay => "RATE_LIMIT_PER_DAY",
        }
    }
}

impl std::fmt::Display for RateLimitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// 网关统一错误类型
///
/// 每个变体都携带稳定的`error_code`字符串，外部调用方只依赖该码；
/// 预期内的失败（限流、无可用worker）也用它表达，而不是panic或裸异常。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 注册或配置入参不合法
    #[error("validation failed: {0}")]
    Validation(String),

    /// 引用了不存在的worker
    #[error("worker '{0}' not found")]
    NotFound(WorkerId),

    /// 被选中的worker触发限流；不会回退到其他worker
    #[error("rate limit exceeded for worker '{worker_id}': {reason} (limit {limit}, current {current}, resets in {reset_after_secs}s)")]
    RateLimited {
        worker_id: WorkerId,
        reason: RateLimitReason,
        limit: u32,
        current: u32,
        reset_after_secs: u64,
    },

    /// 没有满足能力/健康要求的worker
    #[error("no eligible workers available for capabilities {required:?}")]
    NoEligibleWorkers { required: Vec<String> },

    /// 转发到worker失败（三种失败形态见[`ForwardError`]）
    #[error(transparent)]
    Forward(#[from] ForwardError),

    /// 持久化读写失败（有界重试耗尽后）
    #[error("storage failure: {0}")]
    Storage(String),

    /// 未预期的内部故障，在Router边界被捕获后归入此类
    #[error("internal routing error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// 稳定的机器可读错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "VALIDATION_ERROR",
            GatewayError::NotFound(_) => "CLIENT_NOT_FOUND",
            GatewayError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::NoEligibleWorkers { .. } => "NO_CLIENTS_AVAILABLE",
            GatewayError::Forward(e) => e.error_code(),
            GatewayError::Storage(_) => "STORAGE_ERROR",
            GatewayError::Internal(_) => "ROUTING_ERROR",
        }
    }

    /// HTTP状态码等价物，由前端控制器映射响应
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::Validation(_) => 400,
            GatewayError::NotFound(_) => 404,
            GatewayError::RateLimited { .. } => 429,
            GatewayError::NoEligibleWorkers { .. } => 503,
            GatewayError::Forward(_) => 502,
            GatewayError::Storage(_) => 503,
            GatewayError::Internal(_) => 500,
        }
    }

    /// 预期内的失败只记info/warn，不算错误日志
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            GatewayError::Validation(_)
                | GatewayError::NotFound(_)
                | GatewayError::RateLimited { .. }
                | GatewayError::NoEligibleWorkers { .. }
        )
    }
}
