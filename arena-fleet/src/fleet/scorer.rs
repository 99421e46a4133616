use arena_core::WorkerStats;
use chrono::{DateTime, Utc};

/// 活跃度加成上限
const MAX_ACTIVITY_BONUS: f64 = 5.0;

/// 负载打分器
///
/// 产出单个浮点评分，越低越优先：
/// `score = avg_ms/1000 + failure_rate*10 + min(idle_secs/3600, 5)`。
/// 零请求的worker用配置的基准响应时间参与打分，并取满活跃度加成，
/// 避免从未验证过的空闲worker垄断选择。
pub struct LoadScorer {
    baseline_response_ms: f64,
}

impl LoadScorer {
    pub fn new(baseline_response_ms: f64) -> Self {
        Self {
            baseline_response_ms,
        }
    }

    pub fn score(&self, stats: &WorkerStats, now: DateTime<Utc>) -> f64 {
        let average_ms = if stats.total_requests == 0 {
            self.baseline_response_ms
        } else {
            stats.average_response_time_ms
        };

        let activity_bonus = match stats.last_request_at {
            Some(last) => {
                let idle_secs = (now - last).num_seconds().max(0) as f64;
                (idle_secs / 3600.0).min(MAX_ACTIVITY_BONUS)
            }
            None => MAX_ACTIVITY_BONUS,
        };

        (average_ms / 1000.0) + (stats.failure_rate() * 10.0) + activity_bonus
    }
}
