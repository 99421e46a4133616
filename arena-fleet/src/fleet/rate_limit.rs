use arena_core::{RateLimitConfig, RateLimitReason, WorkerId};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const DAY_WINDOW: Duration = Duration::from_secs(86_400);

/// 限流判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        remaining_minute: u32,
        remaining_day: u32,
    },
    Denied {
        reason: RateLimitReason,
        limit: u32,
        current: u32,
        reset_after_secs: u64,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// 按worker维护精确滑动窗口的限流器
///
/// 每个worker保留一份按时间递增的请求时间戳日志，上限为日窗口，
/// 60s与86400s两档都据此精确计数，而不是用总计数近似。
/// 判定与预留是同一个操作：放行时当场追加时间戳，
/// 并发请求不会挤过同一个剩余配额。
pub struct RateLimiter {
    logs: RwLock<HashMap<WorkerId, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
        }
    }

    /// 判定并预留一次请求配额
    ///
    /// 拒绝时不记录时间戳；被拒的请求不占用配额。
    pub async fn check_and_reserve(
        &self,
        worker_id: &str,
        limits: RateLimitConfig,
    ) -> RateDecision {
        let now = Instant::now();
        let mut logs = self.logs.write().await;
        let log = logs.entry(worker_id.to_string()).or_default();

        // 日窗口之外的时间戳永远不再参与计数
        while let Some(front) = log.front() {
            if now.duration_since(*front) >= DAY_WINDOW {
                log.pop_front();
            } else {
                break;
            }
        }

        let day_count = log.len() as u32;
        if day_count >= limits.per_day {
            let reset = log
                .front()
                .map(|oldest| reset_after(now, *oldest, DAY_WINDOW))
                .unwrap_or(0);
            debug!(
                "Rate limit denied for worker {}: {}/{} per day",
                worker_id, day_count, limits.per_day
            );
            return RateDecision::Denied {
                reason: RateLimitReason::PerDay,
                limit: limits.per_day,
                current: day_count,
                reset_after_secs: reset,
            };
        }

        // 时间戳单调递增，从尾部回扫即覆盖整个分钟窗口
        let minute_count = log
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) < MINUTE_WINDOW)
            .count() as u32;
        if minute_count >= limits.per_minute {
            let oldest_in_minute = log
                .iter()
                .rev()
                .take(minute_count as usize)
                .last()
                .copied();
            let reset = oldest_in_minute
                .map(|oldest| reset_after(now, oldest, MINUTE_WINDOW))
                .unwrap_or(0);
            debug!(
                "Rate limit denied for worker {}: {}/{} per minute",
                worker_id, minute_count, limits.per_minute
            );
            return RateDecision::Denied {
                reason: RateLimitReason::PerMinute,
                limit: limits.per_minute,
                current: minute_count,
                reset_after_secs: reset,
            };
        }

        log.push_back(now);
        RateDecision::Allowed {
            remaining_minute: limits.per_minute - minute_count - 1,
            remaining_day: limits.per_day - day_count - 1,
        }
    }
}

/// 最老的窗口内时间戳滑出窗口还需要的秒数（向上取整，至少1秒）
fn reset_after(now: Instant, oldest: Instant, window: Duration) -> u64 {
    let elapsed = now.duration_since(oldest);
    let remaining = window.saturating_sub(elapsed);
    remaining.as_secs().max(1)
}
