//! # 路由配置
//!
//! 管理接口是显式路由，其余所有路径交给代理入口。
//! 管理接口使用完整路径注册而不是 `nest`，代理入口看到的始终是原始路径。

use axum::Router;
use axum::routing::{get, post};

use crate::management::handlers;
use crate::management::server::AppState;

/// 管理接口前缀
pub const MANAGEMENT_PREFIX: &str = "/api/v1";

/// 创建所有路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            &management_path("/metrics"),
            get(handlers::metrics::get_metrics),
        )
        .route(
            &management_path("/metrics/reset"),
            post(handlers::metrics::reset_metrics),
        )
        .route(
            &management_path("/circuit-breakers"),
            get(handlers::circuit_breakers::list_circuit_breakers),
        )
        .route(
            &management_path("/routes"),
            get(handlers::routes::list_routes),
        )
        .route(
            &management_path("/health/services"),
            get(handlers::health::services_health),
        )
        .fallback(handlers::proxy::proxy_handler)
        .with_state(state)
}

fn management_path(path: &str) -> String {
    format!("{MANAGEMENT_PREFIX}{path}")
}
