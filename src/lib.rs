//! # Service Gateway
//!
//! 反向代理网关核心库：前缀路由、按服务熔断、令牌桶准入、服务间凭证与指标统计

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod management;
pub mod proxy;
pub mod statistics;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{ProxyError, Result};
