//! # 入站限流
//!
//! 基于 GCRA 的令牌桶：全局一个限流器，或者按客户端地址每个地址一个。
//! `allow` 从不阻塞，有余量就放行，否则立即拒绝。
//! 按地址的限流器在首次请求时惰性创建，长时间未出现的地址由后台任务清理。

use std::fmt;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use tokio::time::Instant;

use crate::config::RateLimitConfig;

type DirectLimiter<C> = GovernorLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// 按地址限流表中的一项
struct ClientEntry<C: Clock> {
    limiter: DirectLimiter<C>,
    last_seen: Instant,
}

/// 由持续速率与突发容量构造配额
///
/// 速率换算出的补充间隔过小或过大时，分别退化为每秒 `u32::MAX` 次和最长间隔。
#[must_use]
pub fn quota_for(requests_per_second: f64, burst: u32) -> Quota {
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    let period = Duration::try_from_secs_f64(requests_per_second.recip()).unwrap_or(Duration::MAX);
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
        .allow_burst(burst)
}

/// 入站准入控制
pub struct RateLimiter<C: Clock = DefaultClock> {
    enabled: bool,
    quota: Quota,
    clock: C,
    global: DirectLimiter<C>,
    per_client: Option<DashMap<IpAddr, ClientEntry<C>>>,
}

impl<C: Clock + Clone> fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("quota", &self.quota)
            .field("tracked_clients", &self.tracked_clients())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock + Clone> RateLimiter<C> {
    /// 使用指定时钟构建
    #[must_use]
    pub fn with_clock(config: &RateLimitConfig, clock: C) -> Self {
        let quota = quota_for(config.requests_per_second, config.burst);
        Self {
            enabled: config.enabled,
            quota,
            global: GovernorLimiter::direct_with_clock(quota, clock.clone()),
            clock,
            per_client: config.per_client.then(DashMap::new),
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 是否放行本次请求
    ///
    /// 按客户端限流时，拿不到客户端地址的请求走全局限流器。
    pub fn allow(&self, client: Option<IpAddr>) -> bool {
        if !self.enabled {
            return true;
        }

        match (&self.per_client, client) {
            (Some(limiters), Some(addr)) => {
                let mut entry = limiters.entry(addr).or_insert_with(|| ClientEntry {
                    limiter: GovernorLimiter::direct_with_clock(self.quota, self.clock.clone()),
                    last_seen: Instant::now(),
                });
                entry.last_seen = Instant::now();
                entry.limiter.check().is_ok()
            }
            _ => self.global.check().is_ok(),
        }
    }

    /// 当前跟踪的客户端数量
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.per_client.as_ref().map_or(0, DashMap::len)
    }

    /// 清理超过 `idle` 未出现的客户端，返回清理数量
    pub fn prune_idle(&self, idle: Duration) -> usize {
        let Some(limiters) = &self.per_client else {
            return 0;
        };
        let before = limiters.len();
        limiters.retain(|_, entry| entry.last_seen.elapsed() < idle);
        before.saturating_sub(limiters.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn config(rate: f64, burst: u32, per_client: bool) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: rate,
            burst,
            per_client,
            ..RateLimitConfig::default()
        }
    }

    fn fake_limiter(rate: f64, burst: u32) -> (RateLimiter<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::with_clock(&config(rate, burst, false), clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_burst_then_one_per_interval() {
        let (limiter, clock) = fake_limiter(10.0, 5);
        for _ in 0..5 {
            assert!(limiter.allow(None));
        }
        assert!(!limiter.allow(None));

        clock.advance(Duration::from_millis(100));
        assert!(limiter.allow(None));
        assert!(!limiter.allow(None));
    }

    #[test]
    fn test_refill_is_capped_at_burst() {
        let (limiter, clock) = fake_limiter(100.0, 3);
        for _ in 0..3 {
            assert!(limiter.allow(None));
        }
        clock.advance(Duration::from_secs(60));

        let admitted = (0..10).filter(|_| limiter.allow(None)).count();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_fractional_rate() {
        let (limiter, clock) = fake_limiter(0.5, 1);
        assert!(limiter.allow(None));
        clock.advance(Duration::from_secs(1));
        assert!(!limiter.allow(None));
        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow(None));
    }

    #[test]
    fn test_extreme_rates_build_a_quota() {
        assert_eq!(quota_for(1e12, 4).burst_size().get(), 4);
        assert_eq!(quota_for(1e-300, 0).burst_size().get(), 1);
    }

    #[test]
    fn test_disabled_limiter_admits_everything() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: false,
            ..config(1.0, 1, false)
        });
        assert!((0..100).all(|_| limiter.allow(None)));
    }

    #[test]
    fn test_per_client_limiters_are_independent() {
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::with_clock(&config(1.0, 2, true), clock);
        let a = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        let b = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));

        assert!(limiter.allow(a));
        assert!(limiter.allow(a));
        assert!(!limiter.allow(a));
        assert!(limiter.allow(b));
        // 没有地址时走全局限流器
        assert!(limiter.allow(None));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_idle_clients() {
        let limiter = RateLimiter::new(&config(1.0, 2, true));
        let a = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(limiter.allow(a));

        assert_eq!(limiter.prune_idle(Duration::from_secs(10)), 0);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(limiter.prune_idle(Duration::from_secs(10)), 1);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_admission_never_exceeds_burst() {
        let limiter = Arc::new(RateLimiter::new(&config(0.001, 50, false)));
        let handles: Vec<_> = (0..200)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.allow(None) })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 50);
    }
}
