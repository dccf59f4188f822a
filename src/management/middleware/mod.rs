//! # 网关中间件
//!
//! 追踪ID与请求日志、指标记录、准入控制

pub mod admission;
pub mod metrics;
pub mod trace_id;

pub use admission::{client_ip, rate_limit_middleware};
pub use metrics::metrics_middleware;
pub use trace_id::{TRACE_ID_HEADER, TraceId, trace_id_middleware};
