//! # 应用配置结构定义

use crate::ensure_config;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// 网关主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 入站服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 全局准入控制
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// 每个后端共用的熔断参数
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// 出站连接池
    #[serde(default)]
    pub pool: PoolConfig,
    /// 服务间凭证
    #[serde(default)]
    pub credential: CredentialConfig,
    /// 后端服务列表
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    /// 路由表（按注册顺序匹配）
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// 入站服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub bind_address: String,
    /// 监听端口
    pub port: u16,
    /// 入站请求体上限（字节）
    pub max_body_bytes: usize,
    /// 允许的CORS源地址
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9000,
            max_body_bytes: 10 * 1024 * 1024,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// 令牌桶限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// 持续速率（请求/秒）
    pub requests_per_second: f64,
    /// 突发容量
    pub burst: u32,
    /// 是否按客户端地址独立限流
    pub per_client: bool,
    /// 是否信任 `X-Forwarded-For` / `X-Real-IP` 作为客户端地址
    pub trust_forwarded_headers: bool,
    /// 按客户端限流时，空闲多久的桶会被清理（秒）
    pub client_idle_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 100.0,
            burst: 200,
            per_client: false,
            trust_forwarded_headers: false,
            client_idle_secs: 600,
        }
    }
}

/// 熔断器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// CLOSED 状态下累计失败多少次后打开
    pub failure_threshold: u32,
    /// OPEN 状态持续多久后允许试探（秒）
    pub reset_timeout_secs: u64,
    /// HALF_OPEN 状态下需要多少次成功才关闭
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
            success_threshold: 3,
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub const fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

/// 出站连接池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 每个主机保留的空闲连接数
    pub max_idle_per_host: usize,
    /// 空闲连接超时（秒）
    pub idle_timeout_secs: u64,
    /// 建连超时（秒）
    pub connect_timeout_secs: u64,
    /// 单次请求总超时（秒）
    pub request_timeout_secs: u64,
    /// TCP keepalive（秒）
    pub tcp_keepalive_secs: u64,
    /// 每个后端的最大并发请求数
    pub max_concurrency_per_host: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout_secs: 90,
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            tcp_keepalive_secs: 30,
            max_concurrency_per_host: 256,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 启动期凭证获取的退避参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 3_000,
            multiplier: 2.0,
            max_delay_ms: 60_000,
        }
    }
}

/// 服务间凭证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub enabled: bool,
    /// 身份服务地址
    pub identity_base_url: String,
    pub login_path: String,
    pub health_path: String,
    /// 发给下游的 `X-Service-ID`
    pub service_id: String,
    /// 只应通过环境变量提供
    #[serde(skip_serializing)]
    pub service_secret: String,
    /// 发给下游的 `X-Service-Name`
    pub service_name: String,
    /// 令牌有效期（秒）
    pub validity_secs: u64,
    /// 提前刷新的安全余量（秒）
    pub safety_margin_secs: u64,
    /// 发现刷新进行中时的等待时间（毫秒）
    pub refresh_wait_ms: u64,
    /// 启动后首次获取前的等待（秒）
    pub startup_delay_secs: u64,
    /// 身份服务调用超时（秒）
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            identity_base_url: "http://localhost:8207".to_string(),
            login_path: "/api/v1/auth/service/login".to_string(),
            health_path: "/health".to_string(),
            service_id: "central-brain".to_string(),
            service_secret: String::new(),
            service_name: "Central Brain".to_string(),
            validity_secs: 24 * 3600,
            safety_margin_secs: 3600,
            refresh_wait_ms: 500,
            startup_delay_secs: 3,
            request_timeout_secs: 5,
            retry: RetryConfig::default(),
        }
    }
}

/// 后端服务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// 熔断器键，缺省为服务名
    #[serde(default)]
    pub breaker_key: Option<String>,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl ServiceConfig {
    #[must_use]
    pub fn breaker_key(&self) -> &str {
        self.breaker_key.as_deref().unwrap_or(&self.name)
    }
}

/// 路由规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// 引用 `services[].name`
    pub service: String,
    pub path_prefix: String,
    /// 缺省等于 `path_prefix`
    #[serde(default)]
    pub target_prefix: Option<String>,
    /// 相对路径 → 目标路径 的精确改写
    #[serde(default)]
    pub rewrite: BTreeMap<String, String>,
}

impl AppConfig {
    /// 按名称查找后端服务
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        ensure_config!(
            self.server.bind_address.parse::<std::net::IpAddr>().is_ok(),
            "无效的监听地址: {}",
            self.server.bind_address
        );
        ensure_config!(self.server.port != 0, "服务器端口不能为0");
        ensure_config!(self.server.max_body_bytes > 0, "max_body_bytes 必须大于0");

        if self.rate_limit.enabled {
            ensure_config!(
                self.rate_limit.requests_per_second.is_finite()
                    && self.rate_limit.requests_per_second > 0.0,
                "rate_limit.requests_per_second 必须大于0"
            );
            ensure_config!(self.rate_limit.burst > 0, "rate_limit.burst 必须大于0");
        }

        ensure_config!(
            self.circuit_breaker.failure_threshold > 0,
            "circuit_breaker.failure_threshold 必须大于0"
        );
        ensure_config!(
            self.circuit_breaker.success_threshold > 0,
            "circuit_breaker.success_threshold 必须大于0"
        );

        ensure_config!(
            self.pool.max_concurrency_per_host > 0,
            "pool.max_concurrency_per_host 必须大于0"
        );
        ensure_config!(
            self.pool.request_timeout_secs > 0,
            "pool.request_timeout_secs 必须大于0"
        );

        self.validate_credential()?;
        self.validate_services()?;
        self.validate_routes()
    }

    fn validate_credential(&self) -> Result<()> {
        let credential = &self.credential;
        if !credential.enabled {
            return Ok(());
        }

        url::Url::parse(&credential.identity_base_url)?;
        ensure_config!(!credential.service_id.is_empty(), "SERVICE_ID未配置");
        ensure_config!(
            !credential.service_secret.is_empty(),
            "SERVICE_SECRET未配置（必须从环境变量设置）"
        );
        ensure_config!(
            credential.login_path.starts_with('/'),
            "credential.login_path 必须以 / 开头"
        );
        ensure_config!(
            credential.validity_secs > credential.safety_margin_secs,
            "credential.validity_secs 必须大于 safety_margin_secs"
        );
        ensure_config!(
            credential.retry.max_attempts > 0,
            "credential.retry.max_attempts 必须大于0"
        );
        ensure_config!(
            credential.retry.multiplier >= 1.0,
            "credential.retry.multiplier 不能小于1"
        );
        Ok(())
    }

    fn validate_services(&self) -> Result<()> {
        let mut names = HashSet::new();
        for service in &self.services {
            ensure_config!(!service.name.is_empty(), "服务名不能为空");
            ensure_config!(names.insert(&service.name), "重复的服务名: {}", service.name);

            let url = url::Url::parse(&service.base_url).map_err(|e| {
                crate::error::ProxyError::config_with_source(
                    format!("服务 {} 的 base_url 无效: {}", service.name, service.base_url),
                    e,
                )
            })?;
            ensure_config!(
                matches!(url.scheme(), "http" | "https"),
                "服务 {} 的 base_url 必须是 http/https",
                service.name
            );
            ensure_config!(
                service.health_path.starts_with('/'),
                "服务 {} 的 health_path 必须以 / 开头",
                service.name
            );
        }
        Ok(())
    }

    fn validate_routes(&self) -> Result<()> {
        ensure_config!(!self.routes.is_empty(), "必须配置至少一条路由");

        for route in &self.routes {
            ensure_config!(
                self.service(&route.service).is_some(),
                "路由 {} 引用了未定义的服务: {}",
                route.path_prefix,
                route.service
            );
            ensure_config!(
                route.path_prefix.starts_with('/') && route.path_prefix.len() > 1,
                "路由前缀必须以 / 开头且不能为根路径: {}",
                route.path_prefix
            );
            if let Some(target) = &route.target_prefix {
                ensure_config!(
                    target.starts_with('/'),
                    "路由 {} 的 target_prefix 必须以 / 开头",
                    route.path_prefix
                );
            }
            for (from, to) in &route.rewrite {
                ensure_config!(
                    from.starts_with('/') && to.starts_with('/'),
                    "路由 {} 的改写规则必须使用绝对路径: {} -> {}",
                    route.path_prefix,
                    from,
                    to
                );
            }
        }
        Ok(())
    }
}
