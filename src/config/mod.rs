//! # 配置管理模块
//!
//! 处理网关配置的加载、环境变量覆盖和校验

mod app_config;
mod manager;

pub use app_config::{
    AppConfig, CircuitBreakerConfig, CredentialConfig, PoolConfig, RateLimitConfig, RetryConfig,
    RouteConfig, ServerConfig, ServiceConfig,
};
pub use manager::{CONFIG_PATH_ENV, ConfigManager};
