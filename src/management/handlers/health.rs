//! 健康检查相关处理器

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::health::ProbeStatus;
use crate::management::middleware::TraceId;
use crate::management::{response, server::AppState};
use crate::proxy::pool::PoolStats;

/// 网关自身状态
#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayHealth {
    pub service: String,
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub credential_available: bool,
}

/// 后端探测汇总
#[derive(Debug, Serialize)]
pub struct ServicesHealth {
    pub healthy: usize,
    pub total: usize,
    pub services: Vec<crate::health::ServiceHealth>,
    /// 各后端的出站并发占用
    pub pools: BTreeMap<String, PoolStats>,
}

/// `GET /health`
pub async fn health_check(State(state): State<AppState>, trace_id: TraceId) -> impl IntoResponse {
    let health = GatewayHealth {
        service: env!("CARGO_PKG_NAME").to_string(),
        status: "UP".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        credential_available: state.credentials.is_available().await,
    };
    response::success(health, &trace_id)
}

/// `GET /api/v1/health/services`
pub async fn services_health(State(state): State<AppState>, trace_id: TraceId) -> impl IntoResponse {
    let services = state.health.probe_all(&state.pool).await;
    let healthy = services
        .iter()
        .filter(|s| s.status == ProbeStatus::Up)
        .count();
    response::success(
        ServicesHealth {
            healthy,
            total: services.len(),
            services,
            pools: state.pool.stats(),
        },
        &trace_id,
    )
}
