//! 路由表查询处理器

use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::management::middleware::TraceId;
use crate::management::{response, server::AppState};
use crate::proxy::ProxyRoute;

/// 路由表条目
#[derive(Debug, Serialize)]
pub struct RouteView {
    pub path_prefix: String,
    pub service: String,
    pub base_url: String,
    pub target_prefix: String,
    pub rewrites: Vec<String>,
    pub circuit_breaker_key: String,
}

impl From<&ProxyRoute> for RouteView {
    fn from(route: &ProxyRoute) -> Self {
        Self {
            path_prefix: route.path_prefix.clone(),
            service: route.service_name.clone(),
            base_url: route.base_url.clone(),
            target_prefix: route.target_prefix.clone(),
            rewrites: route
                .rewrite_table
                .iter()
                .map(|(from, to)| format!("{from} -> {to}"))
                .collect(),
            circuit_breaker_key: route.circuit_breaker_key.clone(),
        }
    }
}

/// `GET /api/v1/routes`
pub async fn list_routes(State(state): State<AppState>, trace_id: TraceId) -> impl IntoResponse {
    let routes: Vec<RouteView> = state.routes.routes().iter().map(RouteView::from).collect();
    response::success(routes, &trace_id)
}
