//! # 身份服务客户端
//!
//! 调用身份服务的登录接口换取服务级令牌，以及探测其健康状态。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CredentialConfig;
use crate::error::{ProxyError, Result};

/// 身份服务抽象
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// 身份服务是否健康
    async fn health_check(&self) -> Result<()>;

    /// 用服务凭据登录，返回服务令牌
    async fn login(&self) -> Result<String>;
}

/// 登录请求体
#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    service_id: &'a str,
    service_secret: &'a str,
}

/// 身份服务统一响应
#[derive(Debug, Deserialize)]
struct LoginEnvelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    service_token: String,
}

/// 基于 reqwest 的身份服务客户端
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    http_client: reqwest::Client,
    login_url: String,
    health_url: String,
    service_id: String,
    service_secret: String,
}

impl HttpIdentityClient {
    /// 根据凭证配置创建客户端
    pub fn new(config: &CredentialConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("service-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProxyError::config_with_source("创建身份服务客户端失败", e))?;

        let base = config.identity_base_url.trim_end_matches('/');
        Ok(Self {
            http_client,
            login_url: format!("{base}{}", config.login_path),
            health_url: format!("{base}{}", config.health_path),
            service_id: config.service_id.clone(),
            service_secret: config.service_secret.clone(),
        })
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn health_check(&self) -> Result<()> {
        let response = self
            .http_client
            .get(&self.health_url)
            .send()
            .await
            .map_err(|e| ProxyError::health_check(format!("身份服务不可达: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProxyError::health_check(format!(
                "身份服务健康检查返回 {}",
                response.status()
            )))
        }
    }

    async fn login(&self) -> Result<String> {
        let response = self
            .http_client
            .post(&self.login_url)
            .json(&LoginRequest {
                service_id: &self.service_id,
                service_secret: &self.service_secret,
            })
            .send()
            .await
            .map_err(|e| ProxyError::authentication_with_source("请求身份服务失败", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::authentication(format!(
                "身份服务登录返回 HTTP {status}"
            )));
        }

        let envelope: LoginEnvelope = response
            .json()
            .await
            .map_err(|e| ProxyError::authentication_with_source("解析登录响应失败", e))?;

        if envelope.code != 0 {
            return Err(ProxyError::authentication(format!(
                "身份服务拒绝登录: code={}, message={}",
                envelope.code, envelope.message
            )));
        }

        envelope
            .data
            .map(|data| data.service_token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ProxyError::authentication("登录响应缺少 service_token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> CredentialConfig {
        CredentialConfig {
            identity_base_url: server.uri(),
            service_secret: "s3cr3t".to_string(),
            ..CredentialConfig::default()
        }
    }

    #[tokio::test]
    async fn test_login_success_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/service/login"))
            .and(body_json(json!({
                "service_id": "central-brain",
                "service_secret": "s3cr3t"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": {"service_token": "tok-123"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpIdentityClient::new(&config_for(&server)).unwrap();
        assert_eq!(client.login().await.unwrap(), "tok-123");
    }

    #[tokio::test]
    async fn test_login_nonzero_code_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 401,
                "message": "bad secret",
                "data": null
            })))
            .mount(&server)
            .await;

        let client = HttpIdentityClient::new(&config_for(&server)).unwrap();
        let err = client.login().await.unwrap_err();
        assert!(matches!(err, ProxyError::Authentication { .. }));
        assert!(err.to_string().contains("bad secret"));
    }

    #[tokio::test]
    async fn test_login_http_error_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpIdentityClient::new(&config_for(&server)).unwrap();
        assert!(client.login().await.is_err());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpIdentityClient::new(&config_for(&server)).unwrap();
        assert!(client.health_check().await.is_ok());
    }
}
