//! # 内置认证策略
//!
//! 两种封闭的认证形态：静态API密钥，以及可在 401/402 后刷新的外部令牌。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;

use super::traits::{AuthFailureAction, AuthStrategy};
use super::types::UpstreamRequest;

/// 静态API密钥认证
///
/// `Authorization: <prefix><key>` 加上可配置的附加请求头。
/// 请求头在每次请求前派生，策略状态不变。
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    key: String,
    prefix: String,
    extra_headers: Vec<(String, String)>,
}

impl ApiKeyAuth {
    #[must_use]
    pub fn new(key: String, prefix: String, extra_headers: &HashMap<String, String>) -> Self {
        let mut extra: Vec<(String, String)> = extra_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        extra.sort();
        Self {
            key,
            prefix,
            extra_headers: extra,
        }
    }
}

#[async_trait]
impl AuthStrategy for ApiKeyAuth {
    fn name(&self) -> &'static str {
        "api_key"
    }

    async fn prepare_headers(&self, _request: &UpstreamRequest) -> Result<Vec<(String, String)>> {
        let mut headers = vec![(
            "authorization".to_string(),
            format!("{}{}", self.prefix, self.key),
        )];
        headers.extend(self.extra_headers.iter().cloned());
        Ok(headers)
    }
}

/// 令牌来源
///
/// 外部支付/签名协作方实现该接口；核心只负责在 401/402 后请求一枚新令牌。
#[async_trait]
pub trait TokenSource: Send + Sync + std::fmt::Debug {
    /// 取得一枚当前有效的令牌
    async fn fetch(&self) -> Result<String>;
}

/// 固定令牌来源（配置提供的静态令牌）
#[derive(Debug)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// 外部令牌认证
///
/// 附加请求头 + 401/402 失败钩子：钩子向令牌来源要一枚新令牌，
/// 成功则带新请求头重试一次。
#[derive(Debug)]
pub struct TokenAuth {
    source: Arc<dyn TokenSource>,
    prefix: String,
    cached: RwLock<Option<String>>,
}

impl TokenAuth {
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>, prefix: String) -> Self {
        Self {
            source,
            prefix,
            cached: RwLock::new(None),
        }
    }

    fn headers_for(&self, token: &str) -> Vec<(String, String)> {
        vec![(
            "authorization".to_string(),
            format!("{}{}", self.prefix, token),
        )]
    }
}

#[async_trait]
impl AuthStrategy for TokenAuth {
    fn name(&self) -> &'static str {
        "token"
    }

    async fn prepare_headers(&self, _request: &UpstreamRequest) -> Result<Vec<(String, String)>> {
        if let Some(token) = self.cached.read().await.as_ref() {
            return Ok(self.headers_for(token));
        }
        let token = self.source.fetch().await?;
        *self.cached.write().await = Some(token.clone());
        Ok(self.headers_for(&token))
    }

    async fn handle_auth_failure(&self, status: u16, _body: &[u8]) -> AuthFailureAction {
        match self.source.fetch().await {
            Ok(token) => {
                *self.cached.write().await = Some(token.clone());
                AuthFailureAction::Retry {
                    new_headers: self.headers_for(&token),
                }
            }
            Err(e) => {
                lwarn!(
                    "system",
                    LogStage::UpstreamRequest,
                    LogComponent::Auth,
                    "token_refresh_failed",
                    "令牌刷新失败，终止该提供商的尝试",
                    status = status,
                    error = %e
                );
                AuthFailureAction::Terminal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> UpstreamRequest {
        UpstreamRequest {
            model: "openai/gpt-4o".to_string(),
            body: bytes::Bytes::from_static(b"{}"),
            estimated_input_tokens: 10,
            max_output_tokens: 100,
            request_id: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn api_key_headers_are_deterministic() {
        let mut extra = HashMap::new();
        extra.insert("x-referrer".to_string(), "ai-gateway".to_string());
        let auth = ApiKeyAuth::new("sk-test".to_string(), "Bearer ".to_string(), &extra);

        let a = auth.prepare_headers(&request()).await.unwrap();
        let b = auth.prepare_headers(&request()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0], ("authorization".to_string(), "Bearer sk-test".to_string()));
        assert!(a.contains(&("x-referrer".to_string(), "ai-gateway".to_string())));
    }

    #[tokio::test]
    async fn token_auth_refreshes_on_failure() {
        #[derive(Debug)]
        struct Counter(std::sync::atomic::AtomicU32);
        #[async_trait]
        impl TokenSource for Counter {
            async fn fetch(&self) -> Result<String> {
                let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(format!("token-{n}"))
            }
        }

        let auth = TokenAuth::new(
            Arc::new(Counter(std::sync::atomic::AtomicU32::new(0))),
            "Bearer ".to_string(),
        );
        let first = auth.prepare_headers(&request()).await.unwrap();
        assert_eq!(first[0].1, "Bearer token-0");
        // 缓存命中，不再取新令牌
        let again = auth.prepare_headers(&request()).await.unwrap();
        assert_eq!(again[0].1, "Bearer token-0");

        match auth.handle_auth_failure(401, b"{}").await {
            AuthFailureAction::Retry { new_headers } => {
                assert_eq!(new_headers[0].1, "Bearer token-1");
            }
            AuthFailureAction::Terminal => panic!("应返回重试"),
        }
    }
}
