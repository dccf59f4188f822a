//! # 管理与入站接口模块
//!
//! HTTP 服务器、中间件栈、管理接口处理器与统一响应格式

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;

pub use routes::create_routes;
pub use server::{AppState, GatewayServer, build_router};
