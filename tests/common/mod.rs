//! # 集成测试公共设施
//!
//! 可脚本化的mock提供商与网关构建辅助。mock经构建器注入，
//! 不依赖任何进程级状态或真实网络。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use ai_gateway::config::AppConfig;
use ai_gateway::provider::{
    Provider, ProviderRegistry, ProviderResponse, UpstreamRequest,
};
use ai_gateway::proxy::Gateway;

/// 可脚本化的mock提供商
///
/// 响应按脚本顺序弹出；脚本耗尽后返回标准成功响应（回显请求模型）。
/// 全部收到的请求留存，供断言检查转发内容。
#[derive(Debug)]
pub struct MockProvider {
    id: String,
    priority: i32,
    models: Option<Vec<String>>,
    scripted: Mutex<VecDeque<ProviderResponse>>,
    calls: Mutex<Vec<UpstreamRequest>>,
    delay: Duration,
}

impl MockProvider {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            priority: 0,
            models: None,
            scripted: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        })
    }

    pub fn builder(id: &str) -> MockProviderBuilder {
        MockProviderBuilder {
            id: id.to_string(),
            priority: 0,
            models: None,
            scripted: VecDeque::new(),
            delay: Duration::ZERO,
        }
    }

    /// 收到的全部上游请求
    pub fn calls(&self) -> Vec<UpstreamRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// 收到的请求数
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// 标准成功响应体（回显模型）
    pub fn success_body(model: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-mock-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "mock answer"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        })
    }
}

pub struct MockProviderBuilder {
    id: String,
    priority: i32,
    models: Option<Vec<String>>,
    scripted: VecDeque<ProviderResponse>,
    delay: Duration,
}

impl MockProviderBuilder {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 限定可服务的模型；缺省服务一切
    pub fn models(mut self, models: &[&str]) -> Self {
        self.models = Some(models.iter().map(|s| (*s).to_string()).collect());
        self
    }

    /// 追加一个脚本化响应
    pub fn respond(mut self, response: ProviderResponse) -> Self {
        self.scripted.push_back(response);
        self
    }

    /// 追加一个脚本化失败（按状态码与响应体自动分类）
    pub fn respond_error(self, status: u16, body: &str) -> Self {
        let (retryable, kind) =
            ai_gateway::provider::classify_failure(Some(status), body.as_bytes());
        self.respond(ProviderResponse::Failure(
            ai_gateway::provider::ProviderFailure {
                status: Some(status),
                body: Bytes::from(body.as_bytes().to_vec()),
                retryable,
                kind,
            },
        ))
    }

    /// 每次执行前的人工延迟（心跳与去重并发测试用）
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn build(self) -> Arc<MockProvider> {
        Arc::new(MockProvider {
            id: self.id,
            priority: self.priority,
            models: self.models,
            scripted: Mutex::new(self.scripted),
            calls: Mutex::new(Vec::new()),
            delay: self.delay,
        })
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone().unwrap_or_default()
    }

    fn is_available(&self, model_id: &str) -> bool {
        if model_id == "auto" {
            return false;
        }
        self.models
            .as_ref()
            .map_or(true, |models| models.iter().any(|m| m == model_id))
    }

    async fn execute(&self, request: &UpstreamRequest) -> ProviderResponse {
        self.calls.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(scripted) = self.scripted.lock().unwrap().pop_front() {
            return scripted;
        }
        let body = Self::success_body(&request.model).to_string();
        ProviderResponse::Success {
            status: 200,
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("transfer-encoding".to_string(), "chunked".to_string()),
            ],
            body: Bytes::from(body),
        }
    }

    fn estimate_cost(&self, _request: &UpstreamRequest) -> f64 {
        0.0
    }
}

/// 构建注入mock提供商的网关
pub async fn build_gateway(
    providers: Vec<Arc<MockProvider>>,
    configure: impl FnOnce(&mut AppConfig),
) -> Arc<Gateway> {
    let mut config = AppConfig::default();
    configure(&mut config);

    let mut registry = ProviderRegistry::new();
    for provider in providers {
        let provider: Arc<dyn Provider> = provider;
        registry.register(provider).expect("注册mock提供商");
    }

    Gateway::builder(config)
        .with_registry(registry)
        .build()
        .await
        .expect("构建网关")
}

/// 标准聊天请求体
pub fn chat_body(model: &str, content: &str) -> String {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": content}]
    })
    .to_string()
}
