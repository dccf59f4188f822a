//! # 反向代理模块
//!
//! 路由表、熔断器、限流器、连接池和请求分发

pub mod circuit_breaker;
pub mod forwarder;
pub mod pool;
pub mod rate_limiter;
pub mod router;
pub mod service;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitBreakerStats, CircuitState};
pub use pool::ConnectionPool;
pub use rate_limiter::RateLimiter;
pub use router::{ProxyRoute, RouteMatch, RouteTable};
pub use service::ProxyService;
