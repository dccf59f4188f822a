//! # 服务令牌管理
//!
//! 缓存网关自身的服务级令牌，并在过期前按需刷新。
//!
//! - 读路径只拿读锁：缓存有效就直接返回
//! - 同一时刻至多一个刷新在进行，排队的调用者共享这次刷新的结果
//! - 刷新失败时，旧令牌只要还没真正过期就继续使用

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::identity_client::IdentityClient;
use super::retry_policy::BackoffPolicy;
use crate::config::CredentialConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage, sanitize_token};
use crate::{ldebug, lerror, linfo, lwarn};

/// 凭证缓存状态
#[derive(Debug, Default)]
struct CredentialState {
    token: Option<String>,
    /// 超过此刻就需要刷新
    refresh_after: Option<Instant>,
    /// 超过此刻令牌彻底失效
    hard_expiry: Option<Instant>,
    refresh_in_progress: bool,
    /// 每完成一次刷新（无论成败）加一
    generation: u64,
}

impl CredentialState {
    fn fresh_token(&self, now: Instant) -> Option<&str> {
        match (&self.token, self.refresh_after) {
            (Some(token), Some(deadline)) if now < deadline => Some(token),
            _ => None,
        }
    }

    fn usable_token(&self, now: Instant) -> Option<&str> {
        match (&self.token, self.hard_expiry) {
            (Some(token), Some(deadline)) if now < deadline => Some(token),
            _ => None,
        }
    }
}

/// 服务凭证管理器
pub struct CredentialManager {
    enabled: bool,
    service_id: String,
    service_name: String,
    validity: Duration,
    safety_margin: Duration,
    refresh_wait: Duration,
    startup_delay: Duration,
    backoff: BackoffPolicy,
    identity: Arc<dyn IdentityClient>,
    state: RwLock<CredentialState>,
    /// 串行化刷新
    refresh_gate: Mutex<()>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("enabled", &self.enabled)
            .field("service_id", &self.service_id)
            .field("validity", &self.validity)
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    /// 创建凭证管理器，初始无令牌
    pub fn new(config: &CredentialConfig, identity: Arc<dyn IdentityClient>) -> Self {
        Self {
            enabled: config.enabled,
            service_id: config.service_id.clone(),
            service_name: config.service_name.clone(),
            validity: Duration::from_secs(config.validity_secs),
            safety_margin: Duration::from_secs(config.safety_margin_secs),
            refresh_wait: Duration::from_millis(config.refresh_wait_ms),
            startup_delay: Duration::from_secs(config.startup_delay_secs),
            backoff: BackoffPolicy::from(&config.retry),
            identity,
            state: RwLock::new(CredentialState::default()),
            refresh_gate: Mutex::new(()),
        }
    }

    /// 发给下游的 `X-Service-ID`
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// 发给下游的 `X-Service-Name`
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 当前是否持有未彻底过期的令牌
    pub async fn is_available(&self) -> bool {
        self.enabled && self.state.read().await.usable_token(Instant::now()).is_some()
    }

    /// 获取服务令牌
    ///
    /// 返回 `None` 表示当前没有可用凭证，调用方应省略服务认证头。
    pub async fn get_token(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let (observed_generation, in_progress) = {
            let state = self.state.read().await;
            if let Some(token) = state.fresh_token(Instant::now()) {
                return Some(token.to_string());
            }
            (state.generation, state.refresh_in_progress)
        };

        if in_progress {
            tokio::time::sleep(self.refresh_wait).await;
            if let Some(token) = self.state.read().await.fresh_token(Instant::now()) {
                return Some(token.to_string());
            }
        }

        match self.refresh(observed_generation).await {
            Ok(token) => Some(token),
            Err(err) => {
                let fallback = self
                    .state
                    .read()
                    .await
                    .usable_token(Instant::now())
                    .map(str::to_string);
                lwarn!(
                    "system",
                    LogStage::Authentication,
                    LogComponent::Credential,
                    "token_refresh_failed",
                    &format!("服务令牌刷新失败: {err}"),
                    degraded = fallback.is_some()
                );
                fallback
            }
        }
    }

    /// 执行一次刷新；`observed_generation` 之后已经有刷新完成时直接采用其结果
    async fn refresh(&self, observed_generation: u64) -> Result<String> {
        let _gate = self.refresh_gate.lock().await;

        {
            let mut state = self.state.write().await;
            if let Some(token) = state.fresh_token(Instant::now()) {
                return Ok(token.to_string());
            }
            if state.generation != observed_generation {
                return Err(ProxyError::authentication(
                    "并发刷新已失败，沿用其结果",
                ));
            }
            state.refresh_in_progress = true;
        }

        ldebug!(
            "system",
            LogStage::Authentication,
            LogComponent::Credential,
            "token_refresh_start",
            "开始向身份服务申请服务令牌"
        );

        let outcome = self.identity.login().await;

        let mut state = self.state.write().await;
        state.refresh_in_progress = false;
        state.generation += 1;

        let token = outcome?;
        let issued_at = Instant::now();
        state.token = Some(token.clone());
        state.hard_expiry = Some(issued_at + self.validity);
        state.refresh_after = Some(issued_at + self.validity.saturating_sub(self.safety_margin));

        linfo!(
            "system",
            LogStage::Authentication,
            LogComponent::Credential,
            "token_refreshed",
            "服务令牌已更新",
            token = sanitize_token(&token),
            generation = state.generation,
            valid_secs = self.validity.as_secs()
        );

        Ok(token)
    }

    /// 启动期后台获取令牌，不阻塞请求服务
    ///
    /// 每次尝试先探测身份服务健康，再走与请求路径相同的刷新流程。
    /// 重试耗尽后只记录日志，由第一个请求按需刷新。
    pub fn spawn_startup_acquisition(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }

        let manager = Arc::clone(self);
        Some(tokio::spawn(async move {
            tokio::time::sleep(manager.startup_delay).await;

            let result = manager
                .backoff
                .retry("获取服务令牌", |_attempt| {
                    let manager = Arc::clone(&manager);
                    async move {
                        let observed_generation = {
                            let state = manager.state.read().await;
                            if let Some(token) = state.fresh_token(Instant::now()) {
                                return Ok(token.to_string());
                            }
                            state.generation
                        };
                        manager.identity.health_check().await?;
                        manager.refresh(observed_generation).await
                    }
                })
                .await;

            match result {
                Ok(token) => linfo!(
                    "system",
                    LogStage::Startup,
                    LogComponent::Credential,
                    "startup_token_acquired",
                    "启动期服务令牌获取成功",
                    token = sanitize_token(&token)
                ),
                Err(err) => lerror!(
                    "system",
                    LogStage::Startup,
                    LogComponent::Credential,
                    "startup_token_failed",
                    &format!("启动期服务令牌获取失败，改为按需刷新: {err}"),
                    max_attempts = manager.backoff.max_attempts
                ),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按脚本返回登录结果的身份服务
    struct ScriptedIdentity {
        login_calls: AtomicUsize,
        health_calls: AtomicUsize,
        latency: Duration,
        script: std::sync::Mutex<VecDeque<Option<&'static str>>>,
    }

    impl ScriptedIdentity {
        fn new(latency: Duration, script: &[Option<&'static str>]) -> Arc<Self> {
            Arc::new(Self {
                login_calls: AtomicUsize::new(0),
                health_calls: AtomicUsize::new(0),
                latency,
                script: std::sync::Mutex::new(script.iter().copied().collect()),
            })
        }

        fn login_calls(&self) -> usize {
            self.login_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityClient for ScriptedIdentity {
        async fn health_check(&self) -> Result<()> {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn login(&self) -> Result<String> {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            let next = self.script.lock().unwrap().pop_front().flatten();
            next.map(str::to_string)
                .ok_or_else(|| ProxyError::authentication("identity unavailable"))
        }
    }

    fn config() -> CredentialConfig {
        CredentialConfig {
            service_secret: "secret".to_string(),
            validity_secs: 10,
            safety_margin_secs: 2,
            ..CredentialConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_token_is_reused() {
        let identity = ScriptedIdentity::new(Duration::ZERO, &[Some("tok-1")]);
        let manager = CredentialManager::new(&config(), identity.clone());

        assert_eq!(manager.get_token().await.as_deref(), Some("tok-1"));
        assert_eq!(manager.get_token().await.as_deref(), Some("tok-1"));
        assert_eq!(identity.login_calls(), 1);
        assert!(manager.is_available().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let identity = ScriptedIdentity::new(Duration::from_millis(50), &[Some("tok-1")]);
        let manager = Arc::new(CredentialManager::new(&config(), identity.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_token().await })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            assert_eq!(result.unwrap().as_deref(), Some("tok-1"));
        }
        assert_eq!(identity.login_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_failure() {
        let identity = ScriptedIdentity::new(Duration::from_millis(50), &[None]);
        let manager = Arc::new(CredentialManager::new(&config(), identity.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_token().await })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            assert_eq!(result.unwrap(), None);
        }
        assert_eq!(identity.login_calls(), 1);
        assert!(!manager.is_available().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ahead_of_expiry() {
        let identity = ScriptedIdentity::new(Duration::ZERO, &[Some("tok-1"), Some("tok-2")]);
        let manager = CredentialManager::new(&config(), identity.clone());

        assert_eq!(manager.get_token().await.as_deref(), Some("tok-1"));
        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(manager.get_token().await.as_deref(), Some("tok-1"));

        // 超过 validity - margin = 8s
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(manager.get_token().await.as_deref(), Some("tok-2"));
        assert_eq!(identity.login_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_degrades_to_old_token_until_hard_expiry() {
        let identity = ScriptedIdentity::new(Duration::ZERO, &[Some("tok-1"), None, None]);
        let manager = CredentialManager::new(&config(), identity.clone());

        assert_eq!(manager.get_token().await.as_deref(), Some("tok-1"));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(manager.get_token().await.as_deref(), Some("tok-1"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(manager.get_token().await, None);
        assert_eq!(identity.login_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_manager_never_calls_identity() {
        let identity = ScriptedIdentity::new(Duration::ZERO, &[Some("tok-1")]);
        let config = CredentialConfig {
            enabled: false,
            ..config()
        };
        let manager = Arc::new(CredentialManager::new(&config, identity.clone()));

        assert_eq!(manager.get_token().await, None);
        assert!(manager.spawn_startup_acquisition().is_none());
        assert_eq!(identity.login_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_acquisition_retries_with_backoff() {
        let identity = ScriptedIdentity::new(Duration::ZERO, &[None, Some("tok-1")]);
        let manager = Arc::new(CredentialManager::new(&config(), identity.clone()));
        let start = Instant::now();

        manager.spawn_startup_acquisition().unwrap().await.unwrap();

        // 启动延迟 3s + 第一次失败后退避 3s
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert_eq!(identity.login_calls(), 2);
        assert_eq!(identity.health_calls.load(Ordering::SeqCst), 2);
        assert!(manager.is_available().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_exhaustion_defers_to_first_request() {
        let mut config = config();
        config.retry.max_attempts = 2;
        let identity = ScriptedIdentity::new(Duration::ZERO, &[None, None, Some("tok-late")]);
        let manager = Arc::new(CredentialManager::new(&config, identity.clone()));

        manager.spawn_startup_acquisition().unwrap().await.unwrap();
        assert!(!manager.is_available().await);

        assert_eq!(manager.get_token().await.as_deref(), Some("tok-late"));
        assert_eq!(identity.login_calls(), 3);
    }
}
