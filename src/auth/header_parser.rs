//! # 用户令牌解析
//!
//! 入站请求可以通过 `Authorization: Bearer <token>` 或 `accessToken` 头
//! 携带调用者令牌，按此顺序检查。

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// 旧客户端使用的令牌头
pub const ACCESS_TOKEN_HEADER: &str = "accesstoken";

const BEARER_PREFIX: &str = "Bearer ";

/// 提取调用者令牌
#[must_use]
pub fn extract_user_token(headers: &HeaderMap) -> Option<String> {
    let from_authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    from_authorization
        .or_else(|| {
            headers
                .get(ACCESS_TOKEN_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|token| !token.is_empty())
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer user-jwt"));
        headers.insert("accessToken", HeaderValue::from_static("legacy"));
        assert_eq!(extract_user_token(&headers).as_deref(), Some("user-jwt"));
    }

    #[test]
    fn test_access_token_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("accessToken", HeaderValue::from_static("legacy"));
        assert_eq!(extract_user_token(&headers).as_deref(), Some("legacy"));
    }

    #[test]
    fn test_non_bearer_authorization_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(extract_user_token(&headers), None);

        headers.insert("accessToken", HeaderValue::from_static("legacy"));
        assert_eq!(extract_user_token(&headers).as_deref(), Some("legacy"));
    }

    #[test]
    fn test_empty_tokens_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        headers.insert("accessToken", HeaderValue::from_static(""));
        assert_eq!(extract_user_token(&headers), None);
    }
}
