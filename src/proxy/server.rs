//! # 网关服务器
//!
//! 组装全部协作对象并承载HTTP服务。所有依赖经构造注入：
//! 测试可以用新的协作对象组合实例化网关，单个请求的正确性不依赖进程级状态。

use std::sync::Arc;

use axum::Router;
use axum::routing::{any, get, post};
use tower_http::trace::TraceLayer;

use crate::catalog::ModelCatalog;
use crate::config::AppConfig;
use crate::dedup::Deduplicator;
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::provider::{
    BalancePolicy, NoopBalancePolicy, OpenAiCompatProvider, ProviderRegistry,
};
use crate::routing::{ModelSelector, PromptScorer};
use crate::session::SessionStore;
use crate::statistics::UsageCollector;
use crate::{linfo, lwarn};

use super::handler;

/// 网关：请求处理管线的全部协作对象
pub struct Gateway {
    pub(crate) config: AppConfig,
    pub(crate) catalog: Arc<ModelCatalog>,
    pub(crate) scorer: PromptScorer,
    pub(crate) selector: ModelSelector,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) dedup: Arc<Deduplicator>,
    pub(crate) registry: Arc<ProviderRegistry>,
    pub(crate) usage: Arc<UsageCollector>,
    pub(crate) balance: Arc<dyn BalancePolicy>,
}

impl Gateway {
    /// 进入构建流程
    #[must_use]
    pub fn builder(config: AppConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// 配置（只读）
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 模型目录
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    /// 会话存储
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// 用量收集器
    #[must_use]
    pub const fn usage(&self) -> &Arc<UsageCollector> {
        &self.usage
    }

    /// 构建完整路由表
    #[must_use]
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(handler::health))
            .route("/stats", get(handler::stats))
            .route("/v1/models", get(handler::list_models))
            .route("/v1/chat/completions", post(handler::chat_completions))
            // 其余 /v1 路径透明转发到最高优先级提供商
            .route("/v1/{*rest}", any(handler::passthrough))
            .fallback(handler::not_found)
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(self))
    }

    /// 启动HTTP服务并阻塞到收到停机信号
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::error::GatewayError::server_start_with_source(
                format!("监听失败: {addr}"),
                e,
            ))?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Server,
            "listening",
            "网关开始监听",
            addr = %addr,
            providers = self.registry.len(),
            models = self.catalog.len()
        );

        let router = self.router();
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
            .map_err(|e| {
                crate::error::GatewayError::server_start_with_source("HTTP服务异常退出", e)
            })?;

        self.shutdown().await;
        Ok(())
    }

    /// 停机清理：会话清扫任务、提供商、用量落盘
    pub async fn shutdown(&self) {
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Server,
            "shutdown_begin",
            "网关停机中"
        );
        self.sessions.close();
        self.dedup.close();
        self.registry.cleanup_all().await;
        self.usage.close();
    }
}

/// 网关构建器
///
/// 未显式注入的协作对象按配置构建默认实现。
pub struct GatewayBuilder {
    config: AppConfig,
    catalog: Option<Arc<ModelCatalog>>,
    registry: Option<ProviderRegistry>,
    balance: Option<Arc<dyn BalancePolicy>>,
}

impl GatewayBuilder {
    #[must_use]
    pub const fn new(config: AppConfig) -> Self {
        Self {
            config,
            catalog: None,
            registry: None,
            balance: None,
        }
    }

    /// 注入模型目录
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<ModelCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// 注入已注册好的提供商注册表（测试注入mock提供商的入口）
    #[must_use]
    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 注入余额策略
    #[must_use]
    pub fn with_balance_policy(mut self, balance: Arc<dyn BalancePolicy>) -> Self {
        self.balance = Some(balance);
        self
    }

    /// 构建网关并初始化全部提供商
    pub async fn build(self) -> Result<Arc<Gateway>> {
        let config = self.config;
        let catalog = self.catalog.unwrap_or_else(|| Arc::new(ModelCatalog::builtin()));

        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let client = reqwest::Client::new();
                let mut registry = ProviderRegistry::new();
                for provider_config in &config.providers {
                    let provider = OpenAiCompatProvider::from_config(
                        provider_config,
                        Arc::clone(&catalog),
                        client.clone(),
                    )?;
                    registry.register(Arc::new(provider))?;
                }
                registry
            }
        };

        if registry.is_empty() {
            lwarn!(
                "system",
                LogStage::Startup,
                LogComponent::Server,
                "no_providers",
                "未配置任何上游提供商，聊天请求将全部失败"
            );
        }

        for provider in registry.all() {
            provider.initialize().await?;
        }

        let scorer = PromptScorer::new(&config.routing);
        let selector = ModelSelector::new(
            Arc::clone(&catalog),
            config.routing.tiers.clone(),
            &config.fallback,
        );
        let sessions = SessionStore::new(&config.session);
        let dedup = Deduplicator::new(&config.dedup);
        let usage = UsageCollector::new(&config.usage);
        let balance = self
            .balance
            .unwrap_or_else(|| Arc::new(NoopBalancePolicy) as Arc<dyn BalancePolicy>);

        Ok(Arc::new(Gateway {
            config,
            catalog,
            scorer,
            selector,
            sessions,
            dedup,
            registry: Arc::new(registry),
            usage,
            balance,
        }))
    }
}
