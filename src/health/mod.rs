//! # 健康检查模块
//!
//! 按需探测各后端服务的健康检查路径

pub mod checker;

pub use checker::{HealthChecker, ProbeStatus, ServiceHealth};
