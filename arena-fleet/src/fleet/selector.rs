use super::registry::WorkerEntry;
use super::scorer::LoadScorer;
use arena_core::{GatewayError, LoadBalanceStrategy, Worker};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// 一次选择的结果，附带决策时刻的评分
#[derive(Debug, Clone)]
pub struct SelectedWorker {
    pub worker: Worker,
    pub score: f64,
}

/// worker选择器
///
/// 从非空候选列表中按全局配置的策略挑出一个worker。
/// 候选列表的过滤（状态、健康、能力）是调用方的责任。
pub struct WorkerSelector {
    strategy: LoadBalanceStrategy,
    scorer: LoadScorer,
    // round_robin游标；进程级共享，只要求原子性不要求强一致
    cursor: AtomicUsize,
}

impl WorkerSelector {
    pub fn new(strategy: LoadBalanceStrategy, scorer: LoadScorer) -> Self {
        Self {
            strategy,
            scorer,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> LoadBalanceStrategy {
        self.strategy
    }

    /// 从候选列表中选出一个worker
    pub fn pick(
        &self,
        eligible: &[WorkerEntry],
        now: DateTime<Utc>,
    ) -> Result<SelectedWorker, GatewayError> {
        if eligible.is_empty() {
            return Err(GatewayError::NoEligibleWorkers { required: vec![] });
        }

        let index = match self.strategy {
            LoadBalanceStrategy::LeastLoad => self.least_load_index(eligible, now),
            LoadBalanceStrategy::RoundRobin => {
                self.cursor.fetch_add(1, Ordering::Relaxed) % eligible.len()
            }
            LoadBalanceStrategy::Random => rand::rng().random_range(0..eligible.len()),
        };

        let entry = &eligible[index];
        let score = self.scorer.score(&entry.stats, now);
        debug!(
            "Selected worker {} via {} (score {:.3}, {} eligible)",
            entry.worker.id,
            self.strategy.as_str(),
            score,
            eligible.len()
        );

        Ok(SelectedWorker {
            worker: entry.worker.clone(),
            score,
        })
    }

    /// 评分最低者胜出；同分时保留输入顺序中靠前的一个
    fn least_load_index(&self, eligible: &[WorkerEntry], now: DateTime<Utc>) -> usize {
        let mut best = 0;
        let mut best_score = self.scorer.score(&eligible[0].stats, now);
        for (i, entry) in eligible.iter().enumerate().skip(1) {
            let score = self.scorer.score(&entry.stats, now);
            if score < best_score {
                best = i;
                best_score = score;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::{RateLimitConfig, WorkerStats, WorkerStatus};
    use std::collections::BTreeSet;

    fn entry(id: &str, avg_ms: f64, total: u64, failed: u64) -> WorkerEntry {
        let now = Utc::now();
        WorkerEntry {
            worker: Worker {
                id: id.to_string(),
                secret: "s".to_string(),
                name: id.to_string(),
                endpoint: format!("http://127.0.0.1:9100/{id}"),
                capabilities: BTreeSet::from(["chat".to_string()]),
                status: WorkerStatus::Active,
                rate_limit: RateLimitConfig {
                    per_minute: 10,
                    per_day: 1000,
                },
                last_seen: now,
                registered_at: now,
                metadata: Default::default(),
            },
            stats: WorkerStats {
                total_requests: total,
                successful_requests: total - failed,
                failed_requests: failed,
                average_response_time_ms: avg_ms,
                last_request_at: Some(now),
                ..Default::default()
            },
        }
    }

    fn selector(strategy: LoadBalanceStrategy) -> WorkerSelector {
        WorkerSelector::new(strategy, LoadScorer::new(1000.0))
    }

    #[test]
    fn test_empty_list_fails() {
        let s = selector(LoadBalanceStrategy::LeastLoad);
        let err = s.pick(&[], Utc::now()).unwrap_err();
        assert_eq!(err.error_code(), "NO_CLIENTS_AVAILABLE");
    }

    #[test]
    fn test_least_load_is_deterministic() {
        let s = selector(LoadBalanceStrategy::LeastLoad);
        let eligible = vec![
            entry("slow", 2000.0, 100, 0),
            entry("fast", 100.0, 100, 0),
            entry("flaky", 100.0, 100, 50),
        ];
        let now = Utc::now();

        for _ in 0..10 {
            let picked = s.pick(&eligible, now).unwrap();
            assert_eq!(picked.worker.id, "fast");
        }
    }

    #[test]
    fn test_least_load_ties_keep_input_order() {
        let s = selector(LoadBalanceStrategy::LeastLoad);
        let eligible = vec![
            entry("first", 500.0, 100, 0),
            entry("second", 500.0, 100, 0),
        ];
        let picked = s.pick(&eligible, Utc::now()).unwrap();
        assert_eq!(picked.worker.id, "first");
    }

    #[test]
    fn test_round_robin_rotates() {
        let s = selector(LoadBalanceStrategy::RoundRobin);
        let eligible = vec![
            entry("a", 100.0, 10, 0),
            entry("b", 100.0, 10, 0),
            entry("c", 100.0, 10, 0),
        ];
        let now = Utc::now();

        let picks: Vec<String> = (0..6)
            .map(|_| s.pick(&eligible, now).unwrap().worker.id)
            .collect();
        assert_eq!(picks, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn test_random_picks_from_eligible() {
        let s = selector(LoadBalanceStrategy::Random);
        let eligible = vec![entry("a", 100.0, 10, 0), entry("b", 100.0, 10, 0)];
        let now = Utc::now();

        for _ in 0..50 {
            let picked = s.pick(&eligible, now).unwrap();
            assert!(picked.worker.id == "a" || picked.worker.id == "b");
        }
    }
}
