//! # 路由表
//!
//! 启动时由配置构建、之后只读的前缀路由表。
//!
//! 匹配规则：按注册顺序取第一条前缀匹配的路由，不做最长前缀搜索。
//! 剩余的相对路径若在改写表中有精确项则直接使用改写目标，
//! 否则拼接到目标前缀之后。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::AppConfig;
use crate::error::{ProxyError, Result};

/// 一条代理路由
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRoute {
    pub service_name: String,
    /// 不带末尾 `/`
    pub base_url: String,
    pub path_prefix: String,
    pub target_prefix: String,
    /// 相对路径 → 目标路径
    pub rewrite_table: BTreeMap<String, String>,
    pub circuit_breaker_key: String,
}

/// 路由匹配结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a ProxyRoute,
    /// 去掉前缀后的相对路径，总以 `/` 开头
    pub relative_path: String,
    /// 发往后端的路径
    pub target_path: String,
}

impl RouteMatch<'_> {
    /// 完整的后端地址（保留原始查询串）
    #[must_use]
    pub fn target_url(&self, query: Option<&str>) -> String {
        match query.filter(|q| !q.is_empty()) {
            Some(query) => format!("{}{}?{query}", self.route.base_url, self.target_path),
            None => format!("{}{}", self.route.base_url, self.target_path),
        }
    }
}

impl ProxyRoute {
    /// 去掉前缀得到相对路径；不匹配时返回 `None`
    #[must_use]
    pub fn relative_path(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix(&self.path_prefix)?;
        if rest.starts_with('/') {
            Some(rest.to_string())
        } else {
            Some(format!("/{rest}"))
        }
    }

    /// 相对路径对应的目标路径
    #[must_use]
    pub fn target_path(&self, relative: &str) -> String {
        if let Some(rewritten) = self.rewrite_table.get(relative) {
            return rewritten.clone();
        }
        clean_join(&self.target_prefix, relative)
    }
}

/// 把相对路径拼到前缀后并清理 `.`、`..` 和重复的 `/`
///
/// 相对路径先按根路径单独清理，`..` 不会越过目标前缀。
#[must_use]
pub fn clean_join(prefix: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = prefix
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    let floor = segments.len();

    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.len() > floor {
                    segments.pop();
                }
            }
            other => segments.push(other),
        }
    }

    format!("/{}", segments.join("/"))
}

/// 不可变路由表
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<ProxyRoute>,
}

impl RouteTable {
    /// 从已校验的配置构建路由表
    ///
    /// 任意一条路由无效都会使整个构建失败，不存在部分可用的路由表。
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let routes = config
            .routes
            .iter()
            .map(|route| {
                let service = config.service(&route.service).ok_or_else(|| {
                    ProxyError::config(format!(
                        "路由 {} 引用了未定义的服务: {}",
                        route.path_prefix, route.service
                    ))
                })?;

                Ok(ProxyRoute {
                    service_name: service.name.clone(),
                    base_url: service.base_url.trim_end_matches('/').to_string(),
                    path_prefix: route.path_prefix.clone(),
                    target_prefix: route
                        .target_prefix
                        .clone()
                        .unwrap_or_else(|| route.path_prefix.clone()),
                    rewrite_table: route.rewrite.clone(),
                    circuit_breaker_key: service.breaker_key().to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { routes })
    }

    /// 直接用路由列表构建
    #[must_use]
    pub const fn new(routes: Vec<ProxyRoute>) -> Self {
        Self { routes }
    }

    /// 为请求路径选路
    #[must_use]
    pub fn match_route(&self, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            let relative_path = route.relative_path(path)?;
            let target_path = route.target_path(&relative_path);
            Some(RouteMatch {
                route,
                relative_path,
                target_path,
            })
        })
    }

    #[must_use]
    pub fn routes(&self) -> &[ProxyRoute] {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
