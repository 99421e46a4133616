use super::registry::WorkerRegistry;
use arena_core::{probe_payload, ForwardTarget, Forwarder, WorkerId, WorkerStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// 单个worker的一次健康检查结果
#[derive(Debug, Clone, Serialize)]
pub struct HealthResult {
    pub healthy: bool,
    pub response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// 健康检查器
///
/// 逐个探测注册表中所有worker的健康端点并回写权威状态：
/// 探测成功转active，失败转unhealthy。每个worker在独立任务中检查，
/// 单个worker的失败或超时不影响其余worker出结果。
pub struct HealthChecker {
    registry: Arc<WorkerRegistry>,
    forwarder: Arc<dyn Forwarder>,
}

impl HealthChecker {
    pub fn new(registry: Arc<WorkerRegistry>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self {
            registry,
            forwarder,
        }
    }

    /// 检查所有已注册worker
    pub async fn check_all(&self) -> HashMap<WorkerId, HealthResult> {
        let entries = self.registry.list_all().await;
        debug!("Starting health check for {} workers", entries.len());

        let mut tasks = Vec::new();
        for entry in entries {
            let registry = self.registry.clone();
            let forwarder = self.forwarder.clone();
            let worker = entry.worker;
            let worker_id = worker.id.clone();

            let task = tokio::spawn(async move {
                Self::check_worker(&registry, forwarder.as_ref(), &worker).await
            });
            tasks.push((worker_id, task));
        }

        let mut results = HashMap::new();
        for (worker_id, task) in tasks {
            match task.await {
                Ok(result) => {
                    results.insert(worker_id, result);
                }
                Err(e) => {
                    error!("Health check task for worker {} failed: {}", worker_id, e);
                    results.insert(
                        worker_id,
                        HealthResult {
                            healthy: false,
                            response_time_ms: 0.0,
                            details: None,
                            error: Some(format!("health check task failed: {e}")),
                            checked_at: Utc::now(),
                        },
                    );
                }
            }
        }

        let healthy = results.values().filter(|r| r.healthy).count();
        info!(
            "Health check complete: {}/{} workers healthy",
            healthy,
            results.len()
        );
        results
    }

    async fn check_worker(
        registry: &WorkerRegistry,
        forwarder: &dyn Forwarder,
        worker: &arena_core::Worker,
    ) -> HealthResult {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let target = ForwardTarget::for_probe(worker);
        let start = Instant::now();

        let outcome = forwarder
            .forward_buffered(&target, &probe_payload(), &correlation_id)
            .await;
        let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        let checked_at = Utc::now();

        match outcome {
            Ok(details) => {
                debug!(
                    "Worker {} probe ok in {:.1}ms",
                    worker.id, response_time_ms
                );
                let patch = HashMap::from([
                    (
                        "last_health_check".to_string(),
                        serde_json::json!(checked_at),
                    ),
                    ("health_details".to_string(), details.clone()),
                ]);
                if let Err(e) = registry
                    .update_status(&worker.id, WorkerStatus::Active, patch)
                    .await
                {
                    warn!("Failed to update status for worker {}: {}", worker.id, e);
                }
                HealthResult {
                    healthy: true,
                    response_time_ms,
                    details: Some(details),
                    error: None,
                    checked_at,
                }
            }
            Err(e) => {
                warn!(
                    "Worker {} probe failed in {:.1}ms: {} [{}]",
                    worker.id,
                    response_time_ms,
                    e,
                    e.error_code()
                );
                let patch = HashMap::from([
                    (
                        "last_health_check".to_string(),
                        serde_json::json!(checked_at),
                    ),
                    ("health_error".to_string(), serde_json::json!(e.to_string())),
                ]);
                if let Err(err) = registry
                    .update_status(&worker.id, WorkerStatus::Unhealthy, patch)
                    .await
                {
                    warn!("Failed to update status for worker {}: {}", worker.id, err);
                }
                HealthResult {
                    healthy: false,
                    response_time_ms,
                    details: None,
                    error: Some(e.to_string()),
                    checked_at,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::{
        ByteChunkStream, FleetSettings, ForwardError, ForwardOutcome, RegistrationRequest,
    };
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// 按URL决定成败的测试转发器
    struct ScriptedForwarder {
        failing_endpoints: HashSet<String>,
    }

    #[async_trait]
    impl Forwarder for ScriptedForwarder {
        async fn forward_buffered(
            &self,
            target: &ForwardTarget,
            _payload: &serde_json::Value,
            _correlation_id: &str,
        ) -> ForwardOutcome {
            if self.failing_endpoints.iter().any(|e| target.url.starts_with(e)) {
                Err(ForwardError::Request("connection timed out".to_string()))
            } else {
                Ok(serde_json::json!({"status": "ok"}))
            }
        }

        async fn forward_streamed(
            &self,
            _target: &ForwardTarget,
            _payload: &serde_json::Value,
            _correlation_id: &str,
        ) -> Result<ByteChunkStream, ForwardError> {
            Err(ForwardError::Request("not used in this test".to_string()))
        }
    }

    async fn registry_with(names: &[(&str, &str)]) -> (Arc<WorkerRegistry>, HashMap<String, String>) {
        let registry = Arc::new(WorkerRegistry::new(FleetSettings {
            storage_path: String::new(),
            ..Default::default()
        }));
        let mut ids = HashMap::new();
        for (name, endpoint) in names {
            let registration = registry
                .register(RegistrationRequest {
                    name: name.to_string(),
                    endpoint: endpoint.to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
            ids.insert(name.to_string(), registration.id);
        }
        (registry, ids)
    }

    #[tokio::test]
    async fn test_successful_probe_activates_pending_worker() {
        let (registry, ids) = registry_with(&[("alpha", "http://127.0.0.1:9101")]).await;
        let checker = HealthChecker::new(
            registry.clone(),
            Arc::new(ScriptedForwarder {
                failing_endpoints: HashSet::new(),
            }),
        );

        let results = checker.check_all().await;
        let result = &results[&ids["alpha"]];
        assert!(result.healthy);
        assert!(result.details.is_some());

        let entry = registry.get(&ids["alpha"]).await.unwrap();
        assert_eq!(entry.worker.status, WorkerStatus::Active);
        assert!(entry.worker.metadata.contains_key("last_health_check"));
        assert!(entry.worker.metadata.contains_key("health_details"));
    }

    #[tokio::test]
    async fn test_failed_probe_marks_unhealthy_without_blocking_others() {
        let (registry, ids) = registry_with(&[
            ("good", "http://127.0.0.1:9101"),
            ("bad", "http://127.0.0.1:9102"),
        ])
        .await;
        let checker = HealthChecker::new(
            registry.clone(),
            Arc::new(ScriptedForwarder {
                failing_endpoints: HashSet::from(["http://127.0.0.1:9102".to_string()]),
            }),
        );

        let results = checker.check_all().await;
        assert_eq!(results.len(), 2);
        assert!(results[&ids["good"]].healthy);
        assert!(!results[&ids["bad"]].healthy);
        assert!(results[&ids["bad"]].error.is_some());

        let good = registry.get(&ids["good"]).await.unwrap();
        assert_eq!(good.worker.status, WorkerStatus::Active);
        let bad = registry.get(&ids["bad"]).await.unwrap();
        assert_eq!(bad.worker.status, WorkerStatus::Unhealthy);
        assert!(bad.worker.metadata.contains_key("health_error"));
    }

    #[tokio::test]
    async fn test_recovery_after_successful_probe() {
        let (registry, ids) = registry_with(&[("alpha", "http://127.0.0.1:9101")]).await;
        registry
            .update_status(&ids["alpha"], WorkerStatus::Unhealthy, HashMap::new())
            .await
            .unwrap();

        let checker = HealthChecker::new(
            registry.clone(),
            Arc::new(ScriptedForwarder {
                failing_endpoints: HashSet::new(),
            }),
        );
        checker.check_all().await;

        let entry = registry.get(&ids["alpha"]).await.unwrap();
        assert_eq!(entry.worker.status, WorkerStatus::Active);
    }
}
