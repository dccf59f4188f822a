//! 应用上下文
//!
//! 启动时由配置一次性构建，统一持有跨模块共享的组件实例。
//! 各组件通过显式的 `Arc` 传递，没有全局单例。

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{CredentialManager, HttpIdentityClient, IdentityClient};
use crate::config::AppConfig;
use crate::error::Result;
use crate::health::HealthChecker;
use crate::proxy::{CircuitBreakerRegistry, ConnectionPool, ProxyService, RateLimiter, RouteTable};
use crate::statistics::MetricsCollector;

/// 后端健康探测超时
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub routes: Arc<RouteTable>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub pool: Arc<ConnectionPool>,
    pub credentials: Arc<CredentialManager>,
    pub metrics: Arc<MetricsCollector>,
    pub proxy: ProxyService,
    pub health: HealthChecker,
}

impl AppContext {
    /// 使用 HTTP 身份服务客户端构建
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self> {
        let identity = Arc::new(HttpIdentityClient::new(&config.credential)?);
        Self::with_identity(config, identity)
    }

    /// 使用指定的身份服务实现构建
    pub fn with_identity(config: Arc<AppConfig>, identity: Arc<dyn IdentityClient>) -> Result<Self> {
        let routes = Arc::new(RouteTable::from_config(&config)?);
        let breakers = Arc::new(CircuitBreakerRegistry::from_config(&config));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let pool = Arc::new(ConnectionPool::from_config(&config)?);
        let credentials = Arc::new(CredentialManager::new(&config.credential, identity));
        let metrics = Arc::new(MetricsCollector::new());

        let proxy = ProxyService::new(
            Arc::clone(&routes),
            Arc::clone(&breakers),
            Arc::clone(&pool),
            Arc::clone(&credentials),
            config.server.max_body_bytes,
        );

        Ok(Self {
            config,
            routes,
            breakers,
            rate_limiter,
            pool,
            credentials,
            metrics,
            proxy,
            health: HealthChecker::new(HEALTH_PROBE_TIMEOUT),
        })
    }
}
