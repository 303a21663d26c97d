//! # 模型选择器
//!
//! 把 `(层级, 请求约束)` 映射为有序的候选模型链。
//! 链的构造是确定性的：相同输入与配置必得相同链。

use std::sync::Arc;

use crate::catalog::{AUTO_MODEL_ID, ModelCatalog};
use crate::config::{FallbackConfig, TierModels, TierTable};
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;

use super::types::{SelectorConstraints, Tier};

/// 模型选择器
#[derive(Debug)]
pub struct ModelSelector {
    catalog: Arc<ModelCatalog>,
    tiers: TierTable,
    max_attempts: usize,
    last_resort: String,
}

impl ModelSelector {
    #[must_use]
    pub fn new(catalog: Arc<ModelCatalog>, tiers: TierTable, fallback: &FallbackConfig) -> Self {
        Self {
            catalog,
            tiers,
            max_attempts: fallback.max_attempts.max(1),
            last_resort: fallback.last_resort.clone(),
        }
    }

    /// 层级对应的模型配置
    #[must_use]
    pub const fn tier_models(&self, tier: Tier) -> &TierModels {
        match tier {
            Tier::Simple => &self.tiers.simple,
            Tier::Medium => &self.tiers.medium,
            Tier::Complex => &self.tiers.complex,
            Tier::Reasoning => &self.tiers.reasoning,
        }
    }

    /// 构建候选模型链
    ///
    /// 保证非空：过滤后为空时追加配置的兜底模型。
    #[must_use]
    pub fn chain(&self, tier: Tier, constraints: &SelectorConstraints) -> Vec<String> {
        let tier_models = self.tier_models(tier);

        // 会话固定在链首，层级候选随后；按序去重
        let mut candidates: Vec<String> = Vec::new();
        let mut push_unique = |id: &str, out: &mut Vec<String>| {
            if id != AUTO_MODEL_ID && !out.iter().any(|existing| existing == id) {
                out.push(id.to_string());
            }
        };
        if let Some(pin) = &constraints.session_pin {
            push_unique(pin, &mut candidates);
        }
        push_unique(&tier_models.primary, &mut candidates);
        for id in &tier_models.fallback {
            push_unique(id, &mut candidates);
        }

        // 上下文窗口不足的模型必然收到上游4xx，提前剔除
        candidates.retain(|id| {
            self.catalog
                .get(id)
                .map_or(true, |m| m.context_window >= constraints.estimated_tokens)
        });

        // 工具调用/代理偏好：代理能力模型稳定前置，其余保序后移
        if constraints.prefer_agentic {
            let (capable, rest): (Vec<String>, Vec<String>) = candidates
                .into_iter()
                .partition(|id| self.catalog.get(id).map_or(false, |m| m.capabilities.agentic));
            candidates = capable;
            candidates.extend(rest);
        }

        // 目录校验：未知ID丢弃并告警
        candidates.retain(|id| {
            let known = self.catalog.contains(id);
            if !known {
                lwarn!(
                    "selector",
                    LogStage::Routing,
                    LogComponent::Selector,
                    "unknown_model_dropped",
                    "候选链中的模型不在目录中，已丢弃",
                    model = %id
                );
            }
            known
        });

        candidates.truncate(self.max_attempts);

        if candidates.is_empty() {
            candidates.push(self.last_resort.clone());
        }
        candidates
    }
}
