//! # 路由模块
//!
//! 分类器（评分维度 + 逻辑斯蒂校准）与模型选择器（降级链构造）

mod scorer;
mod selector;
mod signals;
mod types;

pub use scorer::PromptScorer;
pub use selector::ModelSelector;
pub use signals::{SignalGroup, SignalSet};
pub use types::{RouteMethod, RoutingDecision, ScoringResult, SelectorConstraints, Tier};

/// 按字符长度估算token数（约4字符/token）
///
/// 真实的tokenizer计数不在目标内；该估算只用于路由与费用估计。
#[must_use]
pub fn approx_tokens(chars: usize) -> usize {
    chars.div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(approx_tokens(0), 0);
        assert_eq!(approx_tokens(1), 1);
        assert_eq!(approx_tokens(4), 1);
        assert_eq!(approx_tokens(9), 3);
    }
}
