use crate::worker::{Worker, WorkerId};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;

/// 健康探测负载中的类型标记
pub const PROBE_PAYLOAD_KIND: &str = "health_probe";

/// 转发失败的三种形态
///
/// 网络层失败、HTTP层失败和响应体解析失败分别对应不同的错误码，
/// 调用方据此决定重试与统计口径。
#[derive(Debug, Clone, thiserror::Error)]
pub enum ForwardError {
    /// 连接失败、超时等网络层错误
    #[error("request to worker failed: {0}")]
    Request(String),

    /// worker返回了非2xx状态
    #[error("worker returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// worker返回的不是合法JSON
    #[error("worker response is not valid JSON: {0}")]
    InvalidResponse(String),
}

impl ForwardError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ForwardError::Request(_) => "CLIENT_REQUEST_FAILED",
            ForwardError::Http { .. } => "CLIENT_HTTP_ERROR",
            ForwardError::InvalidResponse(_) => "INVALID_CLIENT_RESPONSE",
        }
    }

    /// HTTP失败时携带的上游状态码
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ForwardError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 转发结果：成功携带JSON响应体，失败携带分类错误。
/// 转发器保证不会跨越该边界抛出其他错误。
pub type ForwardOutcome = Result<Value, ForwardError>;

/// 流式转发的字节块序列
///
/// 单遍、惰性、只进；上游中途断开时以终止性的`Err`项收尾，
/// 而不是静默截断。
pub type ByteChunkStream = BoxStream<'static, Result<Bytes, ForwardError>>;

/// 一次转发的目标地址与凭证
#[derive(Debug, Clone)]
pub struct ForwardTarget {
    pub worker_id: WorkerId,
    pub url: String,
    /// worker注册时签发的凭证；bridge直通等无凭证目标为None
    pub secret: Option<String>,
}

impl ForwardTarget {
    /// 指向worker业务端点的目标
    pub fn for_worker(worker: &Worker) -> Self {
        Self {
            worker_id: worker.id.clone(),
            url: worker.endpoint.clone(),
            secret: Some(worker.secret.clone()),
        }
    }

    /// 指向worker健康探测端点的目标
    pub fn for_probe(worker: &Worker) -> Self {
        Self {
            worker_id: worker.id.clone(),
            url: format!("{}/health", worker.endpoint.trim_end_matches('/')),
            secret: Some(worker.secret.clone()),
        }
    }

    /// 指向上游bridge的无凭证目标
    pub fn for_bridge(url: &str) -> Self {
        Self {
            worker_id: "bridge".to_string(),
            url: url.to_string(),
            secret: None,
        }
    }
}

/// 请求转发接口
///
/// 这个trait把HTTP转发从fleet管理中隔离出来，
/// 便于健康检查器与Router共用实现并支持单元测试注入。
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// 缓冲转发：POST JSON负载并整体读回响应
    async fn forward_buffered(
        &self,
        target: &ForwardTarget,
        payload: &Value,
        correlation_id: &str,
    ) -> ForwardOutcome;

    /// 流式转发：连接建立后按到达顺序产出原始字节块
    ///
    /// 建立阶段的失败通过外层`Err`返回；流中途失败时
    /// 序列以一个`Err`项终止。
    async fn forward_streamed(
        &self,
        target: &ForwardTarget,
        payload: &Value,
        correlation_id: &str,
    ) -> Result<ByteChunkStream, ForwardError>;
}

/// 健康探测使用的固定轻量负载
pub fn probe_payload() -> Value {
    serde_json::json!({ "type": PROBE_PAYLOAD_KIND })
}
