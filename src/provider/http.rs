//! # OpenAI 兼容上游提供商
//!
//! 唯一的具体提供商实现：对任意 OpenAI 兼容端点执行聊天补全请求。
//! 认证经由注入的 [`AuthStrategy`]，失败按 [`classify_failure`] 分类。

use std::sync::Arc;

use bytes::Bytes;

use async_trait::async_trait;

use crate::catalog::{AUTO_MODEL_ID, ModelCatalog};
use crate::config::{ProviderAuthKind, ProviderConfig};
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lwarn};

use super::auth::{ApiKeyAuth, StaticTokenSource, TokenAuth};
use super::traits::{AuthFailureAction, AuthStrategy, Provider};
use super::types::{ProviderResponse, UpstreamRequest, classify_failure};

/// 网关对上游的标识
const USER_AGENT: &str = concat!("ai-gateway/", env!("CARGO_PKG_VERSION"));

/// 健康检查的有界超时
const HEALTH_CHECK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// OpenAI 兼容提供商
pub struct OpenAiCompatProvider {
    id: String,
    priority: i32,
    base_url: String,
    client: reqwest::Client,
    auth: Arc<dyn AuthStrategy>,
    catalog: Arc<ModelCatalog>,
    models: Vec<String>,
}

impl OpenAiCompatProvider {
    /// 按配置构建提供商实例
    pub fn from_config(
        config: &ProviderConfig,
        catalog: Arc<ModelCatalog>,
        client: reqwest::Client,
    ) -> Result<Self> {
        url::Url::parse(&config.base_url).map_err(|e| {
            crate::config_error!("提供商 {} 的 base_url 无效: {}: {e}", config.id, config.base_url)
        })?;

        let auth: Arc<dyn AuthStrategy> = match config.kind {
            ProviderAuthKind::ApiKey => {
                let key = config
                    .api_key
                    .clone()
                    .ok_or_else(|| crate::config_error!("提供商 {} 缺少 api_key", config.id))?;
                Arc::new(ApiKeyAuth::new(
                    key,
                    config.auth_prefix.clone(),
                    &config.extra_headers,
                ))
            }
            ProviderAuthKind::Token => Arc::new(TokenAuth::new(
                Arc::new(StaticTokenSource::new(
                    config.api_key.clone().unwrap_or_default(),
                )),
                config.auth_prefix.clone(),
            )),
        };

        // 模型清单：显式列表优先；否则取目录中与提供商同族的模型；
        // 同族为空时视为聚合网关，服务目录全部模型
        let models = match &config.models {
            Some(list) => list.clone(),
            None => {
                let family: Vec<String> = catalog
                    .without_synthetic()
                    .filter(|m| m.family() == config.id)
                    .map(|m| m.id.clone())
                    .collect();
                if family.is_empty() {
                    catalog.without_synthetic().map(|m| m.id.clone()).collect()
                } else {
                    family
                }
            }
        };

        Ok(Self {
            id: config.id.clone(),
            priority: config.priority,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            auth,
            catalog,
            models,
        })
    }

    async fn send_once(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Bytes,
    ) -> std::result::Result<(u16, Vec<(String, String)>, Bytes), reqwest::Error> {
        let mut builder = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header("user-agent", USER_AGENT);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.body(body).send().await?;

        let status = response.status().as_u16();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response.bytes().await?;
        Ok((status, response_headers, bytes))
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn is_available(&self, model_id: &str) -> bool {
        model_id != AUTO_MODEL_ID && self.models.iter().any(|m| m == model_id)
    }

    async fn execute(&self, request: &UpstreamRequest) -> ProviderResponse {
        let url = format!("{}/chat/completions", self.base_url);

        let headers = match self.auth.prepare_headers(request).await {
            Ok(headers) => headers,
            Err(e) => {
                lwarn!(
                    request.request_id,
                    LogStage::UpstreamRequest,
                    LogComponent::Provider,
                    "auth_prepare_failed",
                    "认证请求头派生失败",
                    provider = %self.id,
                    error = %e
                );
                return ProviderResponse::network_failure(&format!("认证派生失败: {e}"));
            }
        };

        ldebug!(
            request.request_id,
            LogStage::UpstreamRequest,
            LogComponent::Provider,
            "dispatch",
            "转发上游请求",
            provider = %self.id,
            model = %request.model,
            headers = %crate::logging::format_headers_masked(&headers)
        );

        let first = self.send_once(&url, &headers, request.body.clone()).await;
        let (status, response_headers, body) = match first {
            Ok(parts) => parts,
            Err(e) => return ProviderResponse::network_failure(&e.to_string()),
        };

        // 401/402 交给认证策略的恢复钩子，刷新成功则重试一次
        if status == 401 || status == 402 {
            if let AuthFailureAction::Retry { new_headers } =
                self.auth.handle_auth_failure(status, &body).await
            {
                ldebug!(
                    request.request_id,
                    LogStage::UpstreamRequest,
                    LogComponent::Auth,
                    "auth_retry",
                    "凭证已刷新，重试上游请求",
                    provider = %self.id
                );
                match self.send_once(&url, &new_headers, request.body.clone()).await {
                    Ok((status, response_headers, body)) => {
                        return finish(status, response_headers, body);
                    }
                    Err(e) => return ProviderResponse::network_failure(&e.to_string()),
                }
            }
        }

        finish(status, response_headers, body)
    }

    fn estimate_cost(&self, request: &UpstreamRequest) -> f64 {
        self.catalog.get(&request.model).map_or(0.0, |model| {
            model.estimate_cost(request.estimated_input_tokens, request.max_output_tokens)
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        let probe = self.client.get(&url).header("user-agent", USER_AGENT).send();
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, probe).await {
            Ok(Ok(response)) => response.status().as_u16() < 500,
            _ => false,
        }
    }

    async fn forward_raw(
        &self,
        method: axum::http::Method,
        path_and_query: &str,
        headers: Vec<(String, String)>,
        body: Bytes,
    ) -> ProviderResponse {
        // 客户端路径形如 /v1/embeddings；base_url 已含 /v1 前缀
        let suffix = path_and_query.strip_prefix("/v1").unwrap_or(path_and_query);
        let url = format!("{}{}", self.base_url, suffix);

        let request = UpstreamRequest {
            model: String::new(),
            body: body.clone(),
            estimated_input_tokens: 0,
            max_output_tokens: 0,
            request_id: "passthrough".to_string(),
        };
        let auth_headers = match self.auth.prepare_headers(&request).await {
            Ok(headers) => headers,
            Err(e) => return ProviderResponse::network_failure(&format!("认证派生失败: {e}")),
        };

        let mut builder = self
            .client
            .request(method, &url)
            .header("user-agent", USER_AGENT);
        for (name, value) in headers.iter().chain(auth_headers.iter()) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !body.is_empty() {
            builder = builder.body(body);
        }

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let response_headers: Vec<(String, String)> = response
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .to_str()
                            .ok()
                            .map(|v| (name.as_str().to_string(), v.to_string()))
                    })
                    .collect();
                match response.bytes().await {
                    Ok(bytes) => finish(status, response_headers, bytes),
                    Err(e) => ProviderResponse::network_failure(&e.to_string()),
                }
            }
            Err(e) => ProviderResponse::network_failure(&e.to_string()),
        }
    }
}

/// 把上游响应收敛为成功或已分类的失败
fn finish(status: u16, headers: Vec<(String, String)>, body: Bytes) -> ProviderResponse {
    if (200..300).contains(&status) {
        return ProviderResponse::Success {
            status,
            headers,
            body,
        };
    }
    let (retryable, kind) = classify_failure(Some(status), &body);
    ProviderResponse::Failure(super::types::ProviderFailure {
        status: Some(status),
        body,
        retryable,
        kind,
    })
}
