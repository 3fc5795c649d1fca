//! 限流属性测试
//!
//! 使用 proptest 进行属性测试

use super::*;
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn limiter(window_ms: u64, cap: usize) -> RateLimiter {
    RateLimiter::in_memory(RateLimitPolicy::new(Duration::from_millis(window_ms), cap))
}

#[test]
fn test_allows_up_to_cap_then_denies() {
    let limiter = limiter(60_000, 5);
    let base = Instant::now();

    for i in 0..5 {
        let decision = limiter.check_at("1.2.3.4", base + Duration::from_secs(i));
        assert!(decision.is_allowed(), "请求 {} 应被允许", i);
    }

    let decision = limiter.check_at("1.2.3.4", base + Duration::from_secs(10));
    assert_eq!(
        decision,
        RateLimitDecision::Denied {
            retry_after: Duration::from_secs(50)
        }
    );
}

#[test]
fn test_identities_are_independent() {
    let limiter = limiter(60_000, 1);
    let now = Instant::now();
    assert!(limiter.check_at("a", now).is_allowed());
    assert!(!limiter.check_at("a", now).is_allowed());
    assert!(limiter.check_at("b", now).is_allowed());
}

#[test]
fn test_denied_requests_are_not_recorded() {
    let store = Arc::new(MemoryRateLimitStore::new());
    let limiter = RateLimiter::new(
        store.clone(),
        RateLimitPolicy::new(Duration::from_secs(60), 2),
    );
    let now = Instant::now();
    limiter.check_at("a", now);
    limiter.check_at("a", now);
    limiter.check_at("a", now);
    limiter.check_at("a", now);
    assert_eq!(store.recorded("a"), 2);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_zero_cap_denies_with_full_window() {
    let limiter = limiter(30_000, 0);
    assert_eq!(
        limiter.check_at("a", Instant::now()),
        RateLimitDecision::Denied {
            retry_after: Duration::from_secs(30)
        }
    );
}

#[test]
fn test_retry_after_secs_rounds_up() {
    assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
    assert_eq!(retry_after_secs(Duration::from_millis(0)), 1);
    assert_eq!(retry_after_secs(Duration::from_millis(41_200)), 42);
    assert_eq!(retry_after_secs(Duration::from_secs(7)), 7);
}

#[test]
fn test_concurrent_checks_never_exceed_cap() {
    let limiter = limiter(60_000, 5);
    let now = Instant::now();
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let limiter = limiter.clone();
            std::thread::spawn(move || limiter.check_at("shared", now).is_allowed())
        })
        .collect();
    let allowed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(allowed, 5);
}

/// 生成窗口内的请求时刻偏移（毫秒，已排序）
fn arb_offsets(window_ms: u64, count: usize) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0..window_ms, count).prop_map(|mut offsets| {
        offsets.sort_unstable();
        offsets
    })
}

proptest! {
    /// 对于任意窗口 W 和上限 C：窗口内恰好 C 个请求成功，
    /// 第 C+1 个被拒绝且 retry_after > 0，等待 retry_after 后下一个请求成功
    #[test]
    fn prop_sliding_window_cap(
        (window_ms, offsets) in (1_000u64..120_000u64, 1usize..12usize)
            .prop_flat_map(|(w, c)| (Just(w), arb_offsets(w, c)))
    ) {
        let cap = offsets.len();
        let limiter = limiter(window_ms, cap);
        let base = Instant::now();

        for offset in &offsets {
            let decision = limiter.check_at("client", base + Duration::from_millis(*offset));
            prop_assert!(decision.is_allowed());
        }

        // 第 C+1 个请求落在第一个请求的窗口内
        let last = *offsets.last().unwrap();
        let denied_at = base + Duration::from_millis(last);
        let retry_after = match limiter.check_at("client", denied_at) {
            RateLimitDecision::Denied { retry_after } => retry_after,
            RateLimitDecision::Allowed => {
                return Err(TestCaseError::fail("第 C+1 个请求应被拒绝"));
            }
        };
        prop_assert!(retry_after > Duration::ZERO);
        prop_assert_eq!(
            retry_after,
            Duration::from_millis(offsets[0] + window_ms - last)
        );

        let decision = limiter.check_at("client", denied_at + retry_after);
        prop_assert!(decision.is_allowed());
    }
}
