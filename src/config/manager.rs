//! # 配置管理器
//!
//! 加载 TOML 配置文件、应用环境变量覆盖并做一次性完整校验。
//! 路由表在启动后不可变，因此这里不提供热重载。

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::AppConfig;
use crate::error::{Context, ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::linfo;

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG_PATH";

/// 支持的环境变量覆盖（环境变量名 → 配置项）
const ENV_OVERRIDE_KEYS: [(&str, &str); 5] = [
    ("GATEWAY_BIND_ADDRESS", "server.bind_address"),
    ("GATEWAY_PORT", "server.port"),
    ("GATEWAY_SERVICE_ID", "credential.service_id"),
    ("GATEWAY_SERVICE_SECRET", "credential.service_secret"),
    ("GATEWAY_IDENTITY_URL", "credential.identity_base_url"),
];

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 当前配置
    config: Arc<AppConfig>,
    /// 配置文件路径
    source_path: PathBuf,
}

impl ConfigManager {
    /// 创建配置管理器
    ///
    /// 路径优先级：命令行 → `GATEWAY_CONFIG_PATH` → `config/gateway.{RUST_ENV}.toml`
    pub fn new(cli_path: Option<PathBuf>) -> Result<Self> {
        let config_path = cli_path.unwrap_or_else(Self::default_config_path);
        Self::from_file_with_overrides(&config_path, &Self::build_env_overrides())
    }

    /// 从指定文件创建配置管理器（仍然应用进程环境变量覆盖）
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with_overrides(config_path.as_ref(), &Self::build_env_overrides())
    }

    /// 从指定文件和显式覆盖表创建配置管理器
    pub fn from_file_with_overrides(
        config_path: &Path,
        overrides: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut config = Self::load_config_file(config_path)?;

        Self::apply_env_overrides(&mut config, overrides)?;

        config
            .validate()
            .with_context(|| format!("配置校验失败: {}", config_path.display()))?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "config_loaded",
            &format!("配置加载完成: {}", config_path.display()),
            services = config.services.len(),
            routes = config.routes.len(),
            overrides = overrides.len()
        );

        Ok(Self {
            config: Arc::new(config),
            source_path: config_path.to_path_buf(),
        })
    }

    /// 获取当前配置
    #[must_use]
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// 配置文件路径
    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    fn default_config_path() -> PathBuf {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        PathBuf::from(format!("config/gateway.{env}.toml"))
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            return Err(ProxyError::config(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }

        let config_content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
        })?;

        toml::from_str(&config_content).map_err(|e| {
            ProxyError::config_with_source(
                format!("TOML解析失败 - 配置文件: {}, 详细错误: {e}", path.display()),
                e,
            )
        })
    }

    /// 从进程环境收集覆盖项
    #[must_use]
    pub fn build_env_overrides() -> HashMap<String, String> {
        Self::build_env_overrides_from(|key| env::var(key).ok())
    }

    /// 通过 `lookup` 收集覆盖项，空值视为未设置
    pub fn build_env_overrides_from(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> HashMap<String, String> {
        ENV_OVERRIDE_KEYS
            .iter()
            .filter_map(|(env_key, _)| {
                lookup(env_key)
                    .filter(|v| !v.is_empty())
                    .map(|v| ((*env_key).to_string(), v))
            })
            .collect()
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(
        config: &mut AppConfig,
        overrides: &HashMap<String, String>,
    ) -> Result<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "GATEWAY_BIND_ADDRESS" => config.server.bind_address.clone_from(value),
                "GATEWAY_PORT" => {
                    config.server.port = value.parse().map_err(|e| {
                        ProxyError::config_with_source(format!("GATEWAY_PORT 无效: {value}"), e)
                    })?;
                }
                "GATEWAY_SERVICE_ID" => config.credential.service_id.clone_from(value),
                "GATEWAY_SERVICE_SECRET" => config.credential.service_secret.clone_from(value),
                "GATEWAY_IDENTITY_URL" => config.credential.identity_base_url.clone_from(value),
                other => {
                    return Err(ProxyError::config(format!("未知的环境变量覆盖: {other}")));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[server]
port = 9100

[circuit_breaker]
failure_threshold = 2

[credential]
service_id = "central-brain"

[[services]]
name = "auth-service"
base_url = "http://auth:8207"
breaker_key = "auth"

[[routes]]
service = "auth-service"
path_prefix = "/api/v1/auth"

[[routes]]
service = "auth-service"
path_prefix = "/api/auth"
target_prefix = "/api/v1/auth"
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn secret_override() -> HashMap<String, String> {
        HashMap::from([("GATEWAY_SERVICE_SECRET".to_string(), "s3cr3t".to_string())])
    }

    #[test]
    fn test_load_with_overrides() {
        let file = write_config(SAMPLE);
        let mut overrides = secret_override();
        overrides.insert("GATEWAY_PORT".to_string(), "9200".to_string());

        let manager = ConfigManager::from_file_with_overrides(file.path(), &overrides).unwrap();
        let config = manager.config();

        assert_eq!(config.server.port, 9200);
        assert_eq!(config.credential.service_secret, "s3cr3t");
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        // 未写的字段取默认值
        assert_eq!(config.circuit_breaker.success_threshold, 3);
        assert_eq!(config.routes.len(), 2);
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let file = write_config(SAMPLE);
        let err = ConfigManager::from_file_with_overrides(file.path(), &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("SERVICE_SECRET"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ConfigManager::from_file_with_overrides(
            Path::new("/nonexistent/gateway.toml"),
            &secret_override(),
        )
        .unwrap_err();
        assert!(matches!(err, ProxyError::Config { .. }));
    }

    #[test]
    fn test_invalid_port_override() {
        let file = write_config(SAMPLE);
        let mut overrides = secret_override();
        overrides.insert("GATEWAY_PORT".to_string(), "not-a-port".to_string());
        assert!(ConfigManager::from_file_with_overrides(file.path(), &overrides).is_err());
    }

    #[test]
    fn test_build_env_overrides_skips_unset_and_empty() {
        let vars = HashMap::from([
            ("GATEWAY_SERVICE_ID", "gateway-test"),
            ("GATEWAY_SERVICE_SECRET", ""),
            ("GATEWAY_UNRELATED", "ignored"),
        ]);
        let overrides =
            ConfigManager::build_env_overrides_from(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(overrides.len(), 1);
        assert_eq!(
            overrides.get("GATEWAY_SERVICE_ID").map(String::as_str),
            Some("gateway-test")
        );
        assert!(!overrides.contains_key("GATEWAY_SERVICE_SECRET"));
    }
}
