//! # 提供商注册表
//!
//! 启动时注册一次，此后只读。按优先级（降序，注册顺序决胜）枚举，
//! 健康检查扇出相互隔离，清理幂等。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

use super::traits::Provider;

/// 单个提供商的健康报告
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderHealth {
    pub id: String,
    pub healthy: bool,
    pub latency_ms: u64,
}

/// 提供商注册表
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// 注册提供商；ID重复时失败
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<()> {
        if self.providers.iter().any(|p| p.id() == provider.id()) {
            return Err(crate::config_error!("提供商ID已注册: {}", provider.id()));
        }
        ldebug!(
            "system",
            LogStage::Startup,
            LogComponent::Registry,
            "register",
            "注册提供商",
            provider = %provider.id(),
            priority = provider.priority()
        );
        self.providers.push(provider);
        Ok(())
    }

    /// 按ID查找
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.id() == id).cloned()
    }

    /// 全部提供商（注册顺序）
    #[must_use]
    pub fn all(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// 按优先级降序；同优先级按注册顺序
    #[must_use]
    pub fn by_priority(&self) -> Vec<Arc<dyn Provider>> {
        let mut sorted = self.providers.clone();
        // 稳定排序保持注册顺序决胜
        sorted.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        sorted
    }

    /// 最高优先级的提供商（透传端点的默认目标）
    #[must_use]
    pub fn primary(&self) -> Option<Arc<dyn Provider>> {
        self.by_priority().into_iter().next()
    }

    /// 可服务指定模型的提供商，按优先级排列
    #[must_use]
    pub fn providers_for_model(&self, model_id: &str) -> Vec<Arc<dyn Provider>> {
        self.by_priority()
            .into_iter()
            .filter(|p| p.is_available(model_id))
            .collect()
    }

    /// 健康检查扇出；单个失败不影响其他，也不会使整体失败
    pub async fn health_check_all(&self) -> Vec<ProviderHealth> {
        let checks = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let started = Instant::now();
                let healthy =
                    tokio::time::timeout(Duration::from_secs(2), provider.health_check())
                        .await
                        .unwrap_or(false);
                ProviderHealth {
                    id: provider.id().to_string(),
                    healthy,
                    latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                }
            }
        });
        join_all(checks).await
    }

    /// 全部清理；幂等，尽力而为
    pub async fn cleanup_all(&self) {
        join_all(self.providers.iter().map(|p| p.cleanup())).await;
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Registry,
            "cleanup_all",
            "全部提供商已清理",
            count = self.providers.len()
        );
    }

    /// 已注册数量
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
