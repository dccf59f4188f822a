//! 请求指标模块
//!
//! 全局与按路径的延迟、状态码聚合，供管理接口查询。

pub mod collector;
pub mod types;

pub use collector::MetricsCollector;
pub use types::{Aggregate, AggregateSnapshot, MetricsSnapshot};
