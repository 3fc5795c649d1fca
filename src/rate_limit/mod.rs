//! 请求限流
//!
//! 按客户端身份做滑动窗口计数：
//! - `store`: 可注入的计数存储（默认进程内 `DashMap`）
//! - `identity`: 从代理头解析客户端身份
//!
//! 所有无法识别身份的请求共用 `"unknown"` 桶。这是已知的薄弱点，保持不变。

mod identity;
mod store;

pub use identity::{identity_for_log, resolve_identity, IDENTITY_HEADERS, UNKNOWN_IDENTITY};
pub use store::{MemoryRateLimitStore, RateLimitStore};

use crate::config::RateLimitConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 限流策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// 滑动窗口长度
    pub window: Duration,
    /// 窗口内允许的最大请求数
    pub max_requests: usize,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
        }
    }
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_secs(config.window_secs), config.max_requests)
    }
}

/// 限流判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Denied { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

/// 向上取整到整秒，最少 1 秒
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// 限流器
///
/// 存储以 trait 对象注入，替换为共享外部存储时不需要改动中继逻辑。
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    /// 使用进程内存储创建
    pub fn in_memory(policy: RateLimitPolicy) -> Self {
        Self::new(Arc::new(MemoryRateLimitStore::new()), policy)
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// 检查并记录一次请求
    pub fn check(&self, identity: &str) -> RateLimitDecision {
        self.check_at(identity, Instant::now())
    }

    /// 以指定时刻检查并记录
    pub fn check_at(&self, identity: &str, now: Instant) -> RateLimitDecision {
        let decision = self.store.check_and_record(identity, now, &self.policy);
        if let RateLimitDecision::Denied { retry_after } = decision {
            tracing::info!(
                "[RATE_LIMIT] 拒绝请求: identity={}, retry_after={}ms",
                identity_for_log(identity),
                retry_after.as_millis()
            );
        }
        decision
    }
}

#[cfg(test)]
mod tests;
