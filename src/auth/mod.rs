//! # 服务间认证模块
//!
//! 网关以自身身份调用下游服务时使用的凭证子系统，以及入站用户令牌的解析。
//! 外部只需要 `CredentialManager` 和 `extract_user_token`，其余实现通过子模块路径访问。

pub mod header_parser;
pub mod identity_client;
pub mod retry_policy;
pub mod service_token;

pub use header_parser::extract_user_token;
pub use identity_client::{HttpIdentityClient, IdentityClient};
pub use retry_policy::BackoffPolicy;
pub use service_token::CredentialManager;
