//! # 路由类型定义

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// 成本/能力层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// 简单问答
    Simple,
    /// 常规任务
    Medium,
    /// 复杂任务
    Complex,
    /// 深度推理
    Reasoning,
}

impl Tier {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
            Self::Reasoning => "reasoning",
        }
    }

    /// 从配置字符串解析；未知值返回 None
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "medium" => Some(Self::Medium),
            "complex" => Some(Self::Complex),
            "reasoning" => Some(Self::Reasoning),
            _ => None,
        }
    }

    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Simple, Self::Medium, Self::Complex, Self::Reasoning]
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分类器输出
#[derive(Debug, Clone)]
pub struct ScoringResult {
    /// 加权得分，[0,1]
    pub score: f64,
    /// 逻辑斯蒂校准后的置信度，[0,1]
    pub confidence: f64,
    /// 判定层级；None 表示置信度不足（调用方应用默认层级）
    pub tier: Option<Tier>,
    /// 命中的信号集合，形如 `code:3`
    pub signals: BTreeSet<String>,
    /// 人类可读的判定说明
    pub reasoning: String,
    /// 命中的覆盖规则名（large_context / structured_output / reasoning_markers）
    pub override_applied: Option<&'static str>,
    /// 代理信号 >= 2，选择器应优先代理能力模型
    pub prefers_agentic: bool,
}

/// 路由方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMethod {
    /// 规则分类器选择
    Rules,
    /// 会话固定命中
    Session,
    /// 覆盖规则触发
    Override,
    /// 降级链切换
    Fallback,
}

impl RouteMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Session => "session",
            Self::Override => "override",
            Self::Fallback => "fallback",
        }
    }
}

/// 每个客户端请求产生一次的路由决策
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    /// 最终转发的模型ID
    pub model: String,
    /// 判定层级
    pub tier: Tier,
    /// 分类置信度
    pub confidence: f64,
    /// 路由方法
    pub method: RouteMethod,
    /// 判定说明
    pub reasoning: String,
    /// 估算费用（美元）
    pub cost_estimate: f64,
    /// 基准模型费用（美元）
    pub baseline_cost: f64,
    /// 节省率，[0,1]
    pub savings: f64,
}

/// 选择器约束
#[derive(Debug, Clone, Default)]
pub struct SelectorConstraints {
    /// 估算的输入+输出token总量
    pub estimated_tokens: usize,
    /// 请求声明了 tools 或分类器给出代理偏好
    pub prefer_agentic: bool,
    /// 会话固定的模型（若有），置于链首
    pub session_pin: Option<String>,
}
