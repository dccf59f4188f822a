//! # 熔断器
//!
//! 每个后端服务一个三态熔断器：
//!
//! - `Closed`：正常放行，失败次数达到阈值后打开；成功不清零计数
//! - `Open`：直接拒绝，冷却时间过后的下一个请求转为半开试探
//! - `HalfOpen`：放行试探请求，任一失败重新打开，连续成功达到阈值后关闭
//!
//! 状态只在自身的锁内修改，并发请求不会造成重复跃迁。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::{AppConfig, CircuitBreakerConfig};
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 熔断器快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_secs: u64,
    pub seconds_since_transition: f64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_transition: Instant,
}

impl BreakerInner {
    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.failure_count = 0;
        self.success_count = 0;
        self.last_transition = now;
    }
}

/// 单个服务的熔断器
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            reset_timeout: config.reset_timeout(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_transition: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // 中毒时沿用内部状态
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 请求准入
    ///
    /// `Open` 且冷却未结束时返回 `CircuitOpen`；冷却结束后由本次调用转为 `HalfOpen` 并放行。
    pub fn try_acquire(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let now = Instant::now();
                if now.duration_since(inner.last_transition) >= self.reset_timeout {
                    inner.transition(CircuitState::HalfOpen, now);
                    linfo!(
                        "system",
                        LogStage::Admission,
                        LogComponent::CircuitBreaker,
                        "half_open",
                        &format!("熔断器 {} 进入半开状态", self.name)
                    );
                    Ok(())
                } else {
                    Err(ProxyError::circuit_open(&self.name))
                }
            }
        }
    }

    /// 记录一次成功
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::Open => {}
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.success_threshold {
                    inner.transition(CircuitState::Closed, Instant::now());
                    linfo!(
                        "system",
                        LogStage::Response,
                        LogComponent::CircuitBreaker,
                        "closed",
                        &format!("熔断器 {} 已恢复关闭", self.name)
                    );
                }
            }
        }
    }

    /// 记录一次失败（5xx 或传输失败）
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.transition(CircuitState::Open, Instant::now());
                    lwarn!(
                        "system",
                        LogStage::Response,
                        LogComponent::CircuitBreaker,
                        "opened",
                        &format!("熔断器 {} 打开：失败次数达到阈值", self.name),
                        failure_threshold = self.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.transition(CircuitState::Open, Instant::now());
                lwarn!(
                    "system",
                    LogStage::Response,
                    LogComponent::CircuitBreaker,
                    "reopened",
                    &format!("熔断器 {} 试探失败，重新打开", self.name)
                );
            }
            CircuitState::Open => {}
        }
    }

    /// 按结果记录
    pub fn record(&self, success: bool) {
        if success {
            self.record_success();
        } else {
            self.record_failure();
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            reset_timeout_secs: self.reset_timeout.as_secs(),
            seconds_since_transition: inner.last_transition.elapsed().as_secs_f64(),
        }
    }
}

/// 熔断器注册表
///
/// 启动时为每个熔断器键建立且仅建立一个实例，之后只读。
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerRegistry {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let mut breakers = HashMap::new();
        for service in &config.services {
            let key = service.breaker_key();
            breakers
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(key, &config.circuit_breaker)));
        }
        Self { breakers }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// 所有熔断器的快照，按键排序
    #[must_use]
    pub fn all_stats(&self) -> BTreeMap<String, CircuitBreakerStats> {
        self.breakers
            .iter()
            .map(|(key, breaker)| (key.clone(), breaker.stats()))
            .collect()
    }
}
