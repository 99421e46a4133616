use arena_core::{
    ByteChunkStream, ForwardError, ForwardOutcome, ForwardSettings, ForwardTarget, Forwarder,
    GatewayError,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

/// 转发请求携带的网关标识头
const HEADER_CORRELATION_ID: &str = "X-Correlation-Id";
const HEADER_GATEWAY_CLIENT: &str = "X-Gateway-Client";

/// 基于reqwest的请求转发器
///
/// 每次调用就是一次HTTP尝试，超时按尝试计；
/// 这里不做重试，重试是Router层bridge直通路径的专属行为。
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(settings: &ForwardSettings) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(settings.connect_timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn build_request(
        &self,
        target: &ForwardTarget,
        payload: &serde_json::Value,
        correlation_id: &str,
    ) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(&target.url)
            .header(HEADER_CORRELATION_ID, correlation_id)
            .header(HEADER_GATEWAY_CLIENT, &target.worker_id)
            .json(payload);
        if let Some(secret) = &target.secret {
            request = request.bearer_auth(secret);
        }
        request
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward_buffered(
        &self,
        target: &ForwardTarget,
        payload: &serde_json::Value,
        correlation_id: &str,
    ) -> ForwardOutcome {
        debug!(
            "Forwarding buffered request to worker {} at {} [{}]",
            target.worker_id, target.url, correlation_id
        );

        let response = self
            .build_request(target, payload, correlation_id)
            .send()
            .await
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Worker {} returned HTTP {} [{}]",
                target.worker_id, status, correlation_id
            );
            return Err(ForwardError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ForwardError::InvalidResponse(e.to_string()))
    }

    async fn forward_streamed(
        &self,
        target: &ForwardTarget,
        payload: &serde_json::Value,
        correlation_id: &str,
    ) -> Result<ByteChunkStream, ForwardError> {
        debug!(
            "Forwarding streamed request to worker {} at {} [{}]",
            target.worker_id, target.url, correlation_id
        );

        let response = self
            .build_request(target, payload, correlation_id)
            .send()
            .await
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Worker {} returned HTTP {} before streaming [{}]",
                target.worker_id, status, correlation_id
            );
            return Err(ForwardError::Http {
                status: status.as_u16(),
                body,
            });
        }

        // 中途断开以终止性Err项收尾，reqwest流在错误后自然结束
        let stream = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| ForwardError::Request(format!("stream interrupted: {e}")))
            })
            .boxed();
        Ok(stream)
    }
}
