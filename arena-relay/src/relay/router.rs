use arena_core::{
    ByteChunkStream, ForwardSettings, ForwardTarget, Forwarder, GatewayError, WorkerId,
};
use arena_fleet::{FleetService, RateDecision, SelectedWorker};
use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// bridge直通在统计与日志中使用的标识
const BRIDGE_WORKER_ID: &str = "bridge";

/// 一次缓冲路由的结果
#[derive(Debug, Clone, Serialize)]
pub struct RoutedResponse {
    pub data: serde_json::Value,
    pub worker_id: WorkerId,
    pub response_time_ms: f64,
    pub correlation_id: String,
}

/// 一次流式路由的结果：字节流外加路由元信息
pub struct RoutedStream {
    pub stream: ByteChunkStream,
    pub worker_id: WorkerId,
    pub correlation_id: String,
}

/// 路由编排器
///
/// 核心入口：过滤候选worker、按策略选择、限流判定、转发并回写统计。
/// 被限流的worker不会换成其他worker重试；fleet为空时
/// 可选地直通到上游bridge（唯一带重试的路径）。
/// 子组件的意外故障在这一层拦下，对外只暴露分类后的错误。
#[derive(Clone)]
pub struct Router {
    fleet: Arc<FleetService>,
    forwarder: Arc<dyn Forwarder>,
    settings: ForwardSettings,
}

impl Router {
    pub fn new(
        fleet: Arc<FleetService>,
        forwarder: Arc<dyn Forwarder>,
        settings: ForwardSettings,
    ) -> Self {
        Self {
            fleet,
            forwarder,
            settings,
        }
    }

    /// 缓冲路由一次请求
    pub async fn route(
        &self,
        payload: serde_json::Value,
        required_capabilities: Vec<String>,
    ) -> Result<RoutedResponse, GatewayError> {
        let router = self.clone();
        let task =
            tokio::spawn(async move { router.route_inner(payload, required_capabilities).await });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Routing task failed unexpectedly: {}", e);
                Err(GatewayError::Internal(format!("routing task failed: {e}")))
            }
        }
    }

    /// 流式路由一次请求
    ///
    /// 选择与限流逻辑和[`Router::route`]完全一致；返回的流在自然结束、
    /// 出错或被调用方提前丢弃时都会记录一次结果。
    pub async fn stream_route(
        &self,
        payload: serde_json::Value,
        required_capabilities: Vec<String>,
    ) -> Result<RoutedStream, GatewayError> {
        let router = self.clone();
        let task = tokio::spawn(
            async move { router.stream_route_inner(payload, required_capabilities).await },
        );
        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Streaming routing task failed unexpectedly: {}", e);
                Err(GatewayError::Internal(format!("routing task failed: {e}")))
            }
        }
    }

    async fn route_inner(
        &self,
        payload: serde_json::Value,
        required_capabilities: Vec<String>,
    ) -> Result<RoutedResponse, GatewayError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();

        let selected = match self.select(&required_capabilities, &correlation_id).await? {
            Some(selected) => selected,
            None => return self.bridge_passthrough(&payload, &correlation_id).await,
        };

        let target = ForwardTarget::for_worker(&selected.worker);
        let started = Instant::now();
        let outcome = self
            .forwarder
            .forward_buffered(&target, &payload, &correlation_id)
            .await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.fleet
            .record_outcome_logged(&selected.worker.id, outcome.is_ok(), elapsed_ms)
            .await;

        match outcome {
            Ok(data) => {
                debug!(
                    "Routed request to worker {} in {:.1}ms [{}]",
                    selected.worker.id, elapsed_ms, correlation_id
                );
                Ok(RoutedResponse {
                    data,
                    worker_id: selected.worker.id,
                    response_time_ms: elapsed_ms,
                    correlation_id,
                })
            }
            Err(e) => {
                warn!(
                    "Forward to worker {} failed after {:.1}ms: {} [{}]",
                    selected.worker.id, elapsed_ms, e, correlation_id
                );
                Err(e.into())
            }
        }
    }

    async fn stream_route_inner(
        &self,
        payload: serde_json::Value,
        required_capabilities: Vec<String>,
    ) -> Result<RoutedStream, GatewayError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();

        let selected = match self.select(&required_capabilities, &correlation_id).await? {
            Some(selected) => selected,
            None => return self.bridge_stream_passthrough(&payload, &correlation_id).await,
        };

        let target = ForwardTarget::for_worker(&selected.worker);
        let started = Instant::now();
        let upstream = match self
            .forwarder
            .forward_streamed(&target, &payload, &correlation_id)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                warn!(
                    "Stream to worker {} failed to start: {} [{}]",
                    selected.worker.id, e, correlation_id
                );
                self.fleet
                    .record_outcome_logged(&selected.worker.id, false, elapsed_ms)
                    .await;
                return Err(e.into());
            }
        };

        let stream = guard_stream(
            upstream,
            self.fleet.clone(),
            selected.worker.id.clone(),
            started,
            correlation_id.clone(),
        );

        Ok(RoutedStream {
            stream,
            worker_id: selected.worker.id,
            correlation_id,
        })
    }

    /// 公共的候选过滤+选择+限流阶段
    ///
    /// 返回`Ok(None)`表示fleet为空但bridge可用，由调用方直通。
    async fn select(
        &self,
        required_capabilities: &[String],
        correlation_id: &str,
    ) -> Result<Option<SelectedWorker>, GatewayError> {
        let eligible = self
            .fleet
            .registry()
            .get_available(required_capabilities)
            .await;

        if eligible.is_empty() {
            if self.bridge_enabled() {
                info!(
                    "No eligible workers, passing through to bridge [{}]",
                    correlation_id
                );
                return Ok(None);
            }
            info!(
                "No eligible workers for capabilities {:?} [{}]",
                required_capabilities, correlation_id
            );
            return Err(GatewayError::NoEligibleWorkers {
                required: required_capabilities.to_vec(),
            });
        }

        let selected = self.fleet.selector().pick(&eligible, Utc::now())?;
        debug!(
            "Routing decision: worker {} score {:.3} [{}]",
            selected.worker.id, selected.score, correlation_id
        );

        let decision = self
            .fleet
            .rate_limiter()
            .check_and_reserve(&selected.worker.id, selected.worker.rate_limit)
            .await;
        if let RateDecision::Denied {
            reason,
            limit,
            current,
            reset_after_secs,
        } = decision
        {
            // 被限流的worker不换人重试
            info!(
                "Worker {} rate limited: {} ({}/{}) [{}]",
                selected.worker.id, reason, current, limit, correlation_id
            );
            return Err(GatewayError::RateLimited {
                worker_id: selected.worker.id,
                reason,
                limit,
                current,
                reset_after_secs,
            });
        }

        Ok(Some(selected))
    }

    fn bridge_enabled(&self) -> bool {
        !self.settings.fallback_bridge.is_empty()
    }

    /// bridge缓冲直通，指数退避重试
    async fn bridge_passthrough(
        &self,
        payload: &serde_json::Value,
        correlation_id: &str,
    ) -> Result<RoutedResponse, GatewayError> {
        let target = ForwardTarget::for_bridge(&self.settings.fallback_bridge);
        let started = Instant::now();
        let mut delay = Duration::from_millis(self.settings.bridge_retry_initial_ms);
        let attempts = self.settings.bridge_retry_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self
                .forwarder
                .forward_buffered(&target, payload, correlation_id)
                .await
            {
                Ok(data) => {
                    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                    debug!(
                        "Bridge passthrough ok on attempt {}/{} in {:.1}ms [{}]",
                        attempt, attempts, elapsed_ms, correlation_id
                    );
                    return Ok(RoutedResponse {
                        data,
                        worker_id: BRIDGE_WORKER_ID.to_string(),
                        response_time_ms: elapsed_ms,
                        correlation_id: correlation_id.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        "Bridge passthrough attempt {}/{} failed: {} [{}]",
                        attempt, attempts, e, correlation_id
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Err(GatewayError::Internal(
                "bridge passthrough produced no outcome".to_string(),
            )),
        }
    }

    /// bridge流式直通；建立阶段按同样的退避重试
    async fn bridge_stream_passthrough(
        &self,
        payload: &serde_json::Value,
        correlation_id: &str,
    ) -> Result<RoutedStream, GatewayError> {
        let target = ForwardTarget::for_bridge(&self.settings.fallback_bridge);
        let mut delay = Duration::from_millis(self.settings.bridge_retry_initial_ms);
        let attempts = self.settings.bridge_retry_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self
                .forwarder
                .forward_streamed(&target, payload, correlation_id)
                .await
            {
                Ok(stream) => {
                    debug!(
                        "Bridge stream passthrough ok on attempt {}/{} [{}]",
                        attempt, attempts, correlation_id
                    );
                    return Ok(RoutedStream {
                        stream,
                        worker_id: BRIDGE_WORKER_ID.to_string(),
                        correlation_id: correlation_id.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        "Bridge stream passthrough attempt {}/{} failed: {} [{}]",
                        attempt, attempts, e, correlation_id
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Err(GatewayError::Internal(
                "bridge passthrough produced no outcome".to_string(),
            )),
        }
    }
}

/// 流结束前记录结果的守卫
///
/// 自然结束记成功，中途错误记失败；调用方提前断开时
/// 守卫在Drop中补记一次失败。只记录一次。
struct StreamOutcomeGuard {
    fleet: Arc<FleetService>,
    worker_id: WorkerId,
    started: Instant,
    correlation_id: String,
    recorded: bool,
}

impl StreamOutcomeGuard {
    fn finish(&mut self, success: bool) {
        if self.recorded {
            return;
        }
        self.recorded = true;
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let fleet = self.fleet.clone();
        let worker_id = self.worker_id.clone();
        tokio::spawn(async move {
            fleet
                .record_outcome_logged(&worker_id, success, elapsed_ms)
                .await;
        });
    }
}

impl Drop for StreamOutcomeGuard {
    fn drop(&mut self) {
        if !self.recorded {
            warn!(
                "Stream for worker {} dropped before completion [{}]",
                self.worker_id, self.correlation_id
            );
            self.finish(false);
        }
    }
}

fn guard_stream(
    upstream: ByteChunkStream,
    fleet: Arc<FleetService>,
    worker_id: WorkerId,
    started: Instant,
    correlation_id: String,
) -> ByteChunkStream {
    let guard = StreamOutcomeGuard {
        fleet,
        worker_id,
        started,
        correlation_id,
        recorded: false,
    };

    futures::stream::unfold(
        (upstream, guard),
        |(mut upstream, mut guard)| async move {
            match upstream.next().await {
                Some(Ok(chunk)) => Some((Ok(chunk), (upstream, guard))),
                Some(Err(e)) => {
                    guard.finish(false);
                    Some((Err(e), (upstream, guard)))
                }
                None => {
                    guard.finish(true);
                    None
                }
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::{
        FleetSettings, ForwardError, ForwardOutcome, RateLimitReason, RegistrationRequest,
        WorkerStatus,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 可编排的测试转发器
    #[derive(Default)]
    struct ScriptedForwarder {
        /// URL前缀命中则失败
        failing_endpoints: Vec<String>,
        /// 前N次调用失败（bridge重试测试用）
        fail_first: usize,
        calls: AtomicUsize,
        /// 流中途注入错误
        stream_error_after: Option<usize>,
    }

    impl ScriptedForwarder {
        fn should_fail(&self, url: &str) -> bool {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            call < self.fail_first || self.failing_endpoints.iter().any(|e| url.starts_with(e))
        }
    }

    #[async_trait]
    impl Forwarder for ScriptedForwarder {
        async fn forward_buffered(
            &self,
            target: &ForwardTarget,
            payload: &serde_json::Value,
            _correlation_id: &str,
        ) -> ForwardOutcome {
            if self.should_fail(&target.url) {
                Err(ForwardError::Request("connection refused".to_string()))
            } else {
                Ok(serde_json::json!({"echo": payload, "served_by": target.worker_id}))
            }
        }

        async fn forward_streamed(
            &self,
            target: &ForwardTarget,
            _payload: &serde_json::Value,
            _correlation_id: &str,
        ) -> Result<ByteChunkStream, ForwardError> {
            if self.should_fail(&target.url) {
                return Err(ForwardError::Request("connection refused".to_string()));
            }
            let error_after = self.stream_error_after;
            let chunks: Vec<Result<Bytes, ForwardError>> = (0..3)
                .map(|i| {
                    if Some(i) == error_after {
                        Err(ForwardError::Request("stream interrupted".to_string()))
                    } else {
                        Ok(Bytes::from(format!("chunk-{i}")))
                    }
                })
                .collect();
            Ok(futures::stream::iter(chunks).boxed())
        }
    }

    struct Harness {
        fleet: Arc<FleetService>,
        router: Router,
    }

    async fn harness(forwarder: ScriptedForwarder, settings: ForwardSettings) -> Harness {
        let forwarder: Arc<dyn Forwarder> = Arc::new(forwarder);
        let fleet = Arc::new(FleetService::new(
            FleetSettings {
                storage_path: String::new(),
                ..Default::default()
            },
            forwarder.clone(),
        ));
        let router = Router::new(fleet.clone(), forwarder, settings);
        Harness { fleet, router }
    }

    async fn register_active(
        fleet: &FleetService,
        name: &str,
        per_minute: u32,
    ) -> String {
        let registry = fleet.registry();
        let registration = registry
            .register(RegistrationRequest {
                name: name.to_string(),
                endpoint: format!("http://127.0.0.1:9100/{name}"),
                capabilities: Some(vec!["chat".to_string()]),
                rate_limit: Some(per_minute),
                ..Default::default()
            })
            .await
            .unwrap();
        registry
            .update_status(&registration.id, WorkerStatus::Active, HashMap::new())
            .await
            .unwrap();
        registration.id
    }

    #[tokio::test]
    async fn test_empty_fleet_fails_fast() {
        let h = harness(ScriptedForwarder::default(), ForwardSettings::default()).await;
        let err = h
            .router
            .route(serde_json::json!({}), vec!["chat".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NO_CLIENTS_AVAILABLE");
    }

    #[tokio::test]
    async fn test_route_records_success() {
        let h = harness(ScriptedForwarder::default(), ForwardSettings::default()).await;
        let id = register_active(&h.fleet, "alpha", 10).await;

        let response = h
            .router
            .route(serde_json::json!({"message": "hi"}), vec!["chat".to_string()])
            .await
            .unwrap();
        assert_eq!(response.worker_id, id);
        assert_eq!(response.data["echo"]["message"], "hi");
        assert!(!response.correlation_id.is_empty());

        let entry = h.fleet.registry().get(&id).await.unwrap();
        assert_eq!(entry.stats.total_requests, 1);
        assert_eq!(entry.stats.successful_requests, 1);
    }

    #[tokio::test]
    async fn test_forward_failure_is_recorded_and_surfaced() {
        let h = harness(
            ScriptedForwarder {
                failing_endpoints: vec!["http://127.0.0.1:9100/alpha".to_string()],
                ..Default::default()
            },
            ForwardSettings::default(),
        )
        .await;
        let id = register_active(&h.fleet, "alpha", 10).await;

        let err = h
            .router
            .route(serde_json::json!({}), vec!["chat".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CLIENT_REQUEST_FAILED");
        assert_eq!(err.http_status(), 502);

        let entry = h.fleet.registry().get(&id).await.unwrap();
        assert_eq!(entry.stats.total_requests, 1);
        assert_eq!(entry.stats.failed_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_request_within_minute_is_rate_limited() {
        let h = harness(ScriptedForwarder::default(), ForwardSettings::default()).await;
        let id = register_active(&h.fleet, "alpha", 2).await;

        for _ in 0..2 {
            h.router
                .route(serde_json::json!({}), vec!["chat".to_string()])
                .await
                .unwrap();
        }

        let err = h
            .router
            .route(serde_json::json!({}), vec!["chat".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(err.http_status(), 429);
        match err {
            GatewayError::RateLimited {
                worker_id, reason, ..
            } => {
                assert_eq!(worker_id, id);
                assert_eq!(reason, RateLimitReason::PerMinute);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // 拒绝的请求不计入worker统计
        let entry = h.fleet.registry().get(&id).await.unwrap();
        assert_eq!(entry.stats.total_requests, 2);
    }

    #[tokio::test]
    async fn test_stream_route_yields_chunks_and_records_success() {
        let h = harness(ScriptedForwarder::default(), ForwardSettings::default()).await;
        let id = register_active(&h.fleet, "alpha", 10).await;

        let routed = h
            .router
            .stream_route(serde_json::json!({}), vec!["chat".to_string()])
            .await
            .unwrap();
        assert_eq!(routed.worker_id, id);

        let chunks: Vec<_> = routed.stream.collect().await;
        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.into_iter().enumerate() {
            assert_eq!(chunk.unwrap(), Bytes::from(format!("chunk-{i}")));
        }

        // 结果由守卫在后台任务里记录
        tokio::time::sleep(Duration::from_millis(50)).await;
        let entry = h.fleet.registry().get(&id).await.unwrap();
        assert_eq!(entry.stats.total_requests, 1);
        assert_eq!(entry.stats.successful_requests, 1);
    }

    #[tokio::test]
    async fn test_stream_error_records_failure() {
        let h = harness(
            ScriptedForwarder {
                stream_error_after: Some(1),
                ..Default::default()
            },
            ForwardSettings::default(),
        )
        .await;
        let id = register_active(&h.fleet, "alpha", 10).await;

        let routed = h
            .router
            .stream_route(serde_json::json!({}), vec!["chat".to_string()])
            .await
            .unwrap();
        let chunks: Vec<_> = routed.stream.collect().await;
        assert!(chunks.iter().any(|c| c.is_err()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let entry = h.fleet.registry().get(&id).await.unwrap();
        assert_eq!(entry.stats.failed_requests, 1);
    }

    #[tokio::test]
    async fn test_dropped_stream_records_failure() {
        let h = harness(ScriptedForwarder::default(), ForwardSettings::default()).await;
        let id = register_active(&h.fleet, "alpha", 10).await;

        let routed = h
            .router
            .stream_route(serde_json::json!({}), vec!["chat".to_string()])
            .await
            .unwrap();

        // 只消费一个chunk就断开
        let mut stream = routed.stream;
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from("chunk-0"));
        drop(stream);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let entry = h.fleet.registry().get(&id).await.unwrap();
        assert_eq!(entry.stats.total_requests, 1);
        assert_eq!(entry.stats.failed_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_passthrough_retries_then_succeeds() {
        let settings = ForwardSettings {
            fallback_bridge: "http://127.0.0.1:9999/bridge".to_string(),
            bridge_retry_attempts: 3,
            bridge_retry_initial_ms: 200,
            ..Default::default()
        };
        let h = harness(
            ScriptedForwarder {
                fail_first: 2,
                ..Default::default()
            },
            settings,
        )
        .await;

        let response = h
            .router
            .route(serde_json::json!({"message": "hi"}), vec!["chat".to_string()])
            .await
            .unwrap();
        assert_eq!(response.worker_id, "bridge");
        assert_eq!(response.data["echo"]["message"], "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bridge_passthrough_gives_up_after_attempts() {
        let settings = ForwardSettings {
            fallback_bridge: "http://127.0.0.1:9999/bridge".to_string(),
            bridge_retry_attempts: 3,
            bridge_retry_initial_ms: 200,
            ..Default::default()
        };
        let h = harness(
            ScriptedForwarder {
                fail_first: 10,
                ..Default::default()
            },
            settings,
        )
        .await;

        let err = h
            .router
            .route(serde_json::json!({}), vec!["chat".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CLIENT_REQUEST_FAILED");
    }
}
