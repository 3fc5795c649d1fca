//! 限流计数存储

use super::{RateLimitDecision, RateLimitPolicy};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Instant;

/// 限流计数存储
///
/// `check_and_record` 必须对同一身份原子执行：剪枝、判定、记录在同一个临界区内完成，
/// 否则两个并发请求可能同时看到剩余容量。
pub trait RateLimitStore: Send + Sync {
    fn check_and_record(
        &self,
        identity: &str,
        now: Instant,
        policy: &RateLimitPolicy,
    ) -> RateLimitDecision;

    /// 当前记录的身份数量
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 进程内存储
///
/// 每个身份一条时间戳队列；条目只在检查时惰性剪枝，从不主动删除。
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    entries: DashMap<String, VecDeque<Instant>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某个身份当前窗口内的请求数（不剪枝）
    pub fn recorded(&self, identity: &str) -> usize {
        self.entries.get(identity).map(|e| e.len()).unwrap_or(0)
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn check_and_record(
        &self,
        identity: &str,
        now: Instant,
        policy: &RateLimitPolicy,
    ) -> RateLimitDecision {
        // entry() 持有分片写锁，整个判定在锁内完成
        let mut entry = self.entries.entry(identity.to_string()).or_default();
        let timestamps = entry.value_mut();

        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= policy.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= policy.max_requests {
            let retry_after = match timestamps.front() {
                Some(oldest) => (*oldest + policy.window).saturating_duration_since(now),
                None => policy.window,
            };
            return RateLimitDecision::Denied { retry_after };
        }

        timestamps.push_back(now);
        RateLimitDecision::Allowed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
