//! # 网关服务器
//!
//! Axum HTTP服务器：管理接口与代理入口共用一个监听端口。

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::ops::Deref;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::middleware::{metrics_middleware, rate_limit_middleware, trace_id_middleware};
use crate::app::AppContext;
use crate::auth::header_parser::ACCESS_TOKEN_HEADER;
use crate::config::ServerConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};

/// 服务器应用状态
#[derive(Clone)]
pub struct AppState {
    context: Arc<AppContext>,
}

impl AppState {
    #[must_use]
    pub const fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    #[must_use]
    pub const fn context_arc(&self) -> &Arc<AppContext> {
        &self.context
    }
}

impl Deref for AppState {
    type Target = AppContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

/// 网关服务器
pub struct GatewayServer {
    config: ServerConfig,
    router: Router,
}

impl GatewayServer {
    #[must_use]
    pub fn new(context: Arc<AppContext>) -> Self {
        let config = context.config.server.clone();
        let router = build_router(AppState::new(context), &config);
        Self { config, router }
    }

    /// 解析监听地址
    pub fn bind_address(&self) -> Result<SocketAddr> {
        let bind_address = &self.config.bind_address;
        let ip = bind_address.parse::<IpAddr>().map_err(|e| {
            ProxyError::config_with_source(format!("无效的监听地址 '{bind_address}'"), e)
        })?;
        Ok(SocketAddr::new(ip, self.config.port))
    }

    /// 启动服务器，直到 `shutdown` 完成后优雅退出
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.bind_address()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::server_start_with_source(format!("无法绑定 {addr}"), e))?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "server_start",
            &format!("网关开始监听 {addr}")
        );

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ProxyError::server_start_with_source("网关服务器异常退出", e))?;

        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "server_stopped",
            "网关已停止接收新连接"
        );
        Ok(())
    }
}

/// 构建带完整中间件栈的路由器
///
/// 请求依次经过：HTTP追踪与CORS、追踪ID、指标记录、限流，最后到达处理器。
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let service_builder = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins));

    super::routes::create_routes(state.clone())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state,
            metrics_middleware,
        ))
        .layer(axum::middleware::from_fn(trace_id_middleware))
        .layer(service_builder)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(ACCESS_TOKEN_HEADER),
        ]);

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    match origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<std::result::Result<Vec<_>, _>>()
    {
        Ok(origins) => layer.allow_origin(origins),
        Err(e) => {
            lwarn!(
                "system",
                LogStage::Startup,
                LogComponent::ServerSetup,
                "cors_config_fail",
                &format!("CORS 源配置无效: {e}，回退为允许任意源")
            );
            layer.allow_origin(Any)
        }
    }
}
