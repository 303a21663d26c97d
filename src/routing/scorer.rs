//! # 提示词分类器
//!
//! 纯函数评分：15个加权维度的线性组合，经逻辑斯蒂校准得到置信度，
//! 再按边界映射到层级。无任何网络I/O，单次评分亚毫秒级。

use std::collections::BTreeSet;

use crate::config::RoutingConfig;

use super::signals::{MATCH_CAP, SignalSet};
use super::types::{ScoringResult, Tier};

/// 单个维度的评分
#[derive(Debug, Clone, Copy)]
struct DimensionScore {
    name: &'static str,
    weight: f64,
    /// 有符号幅度，[-1,1]；creative/simple 等降压维度为负
    magnitude: f64,
    matches: usize,
}

/// 提示词分类器
///
/// 不持有可变状态：固定配置下 `classify(p, s, t)` 恒等。
#[derive(Debug)]
pub struct PromptScorer {
    signals: SignalSet,
    confidence_threshold: f64,
    reasoning_confidence: f64,
    calibration_k: f64,
    calibration_midpoint: f64,
    max_scan_chars: usize,
    large_context_tokens: usize,
    structured_output_enabled: bool,
    default_tier: Tier,
}

impl PromptScorer {
    #[must_use]
    pub fn new(routing: &RoutingConfig) -> Self {
        Self {
            signals: SignalSet::from_config(&routing.scoring),
            confidence_threshold: routing.confidence_threshold,
            reasoning_confidence: routing.reasoning_confidence,
            calibration_k: routing.calibration_k,
            calibration_midpoint: routing.calibration_midpoint,
            max_scan_chars: routing.max_scan_chars,
            large_context_tokens: routing.large_context_tokens,
            structured_output_enabled: routing.structured_output,
            default_tier: Tier::parse(&routing.default_tier).unwrap_or(Tier::Medium),
        }
    }

    /// 置信度不足时调用方应使用的默认层级
    #[must_use]
    pub const fn default_tier(&self) -> Tier {
        self.default_tier
    }

    /// 分类一个提示词
    ///
    /// `approx_tokens` 为全文的近似token数（按字符长度估算，不受扫描截断影响）。
    #[must_use]
    pub fn classify(&self, prompt: &str, system_prompt: &str, approx_tokens: usize) -> ScoringResult {
        // 空提示词：无信号可评，按最简单层级处理
        if prompt.trim().is_empty() {
            return ScoringResult {
                score: 0.0,
                confidence: 1.0,
                tier: Some(Tier::Simple),
                signals: BTreeSet::new(),
                reasoning: "empty prompt".to_string(),
                override_applied: None,
                prefers_agentic: false,
            };
        }

        // 关键词统计只扫描前缀；token估算仍基于全长
        let scan = truncate_to_char_boundary(prompt, self.max_scan_chars);

        let dims = self.score_dimensions(scan, approx_tokens);

        let raw: f64 = dims.iter().map(|d| d.weight * d.magnitude).sum();
        let score = raw.clamp(0.0, 1.0);

        // 逻辑斯蒂校准：calibrated 是"任务复杂"的概率，
        // 置信度取距离不确定点的幅度，两端都算高置信
        let calibrated =
            1.0 / (1.0 + (-self.calibration_k * (score - self.calibration_midpoint)).exp());
        let mut confidence = calibrated.max(1.0 - calibrated);

        let mut signals: BTreeSet<String> = dims
            .iter()
            .filter(|d| d.matches > 0)
            .map(|d| format!("{}:{}", d.name, d.matches))
            .collect();

        let reasoning_matches = dims
            .iter()
            .find(|d| d.name == "reasoning")
            .map_or(0, |d| d.matches);
        let agentic_matches = dims
            .iter()
            .find(|d| d.name == "agentic")
            .map_or(0, |d| d.matches);

        // 层级判定
        let mut tier = if reasoning_matches >= 2 {
            confidence = confidence.max(self.reasoning_confidence);
            Some(Tier::Reasoning)
        } else if confidence < self.confidence_threshold {
            None
        } else if score < 0.30 {
            Some(Tier::Simple)
        } else if score < 0.60 {
            Some(Tier::Medium)
        } else if score < 0.80 {
            Some(Tier::Complex)
        } else {
            Some(Tier::Reasoning)
        };

        // 覆盖规则，按序应用
        let mut override_applied = None;
        if approx_tokens > self.large_context_tokens {
            tier = Some(Tier::Complex);
            override_applied = Some("large_context");
            signals.insert(format!("approx_tokens:{approx_tokens}"));
        }
        if self.structured_output_enabled
            && self.signals.structured_output.is_match(system_prompt)
            && tier.map_or(true, |t| t < Tier::Medium)
        {
            tier = Some(Tier::Medium);
            override_applied = override_applied.or(Some("structured_output"));
            signals.insert("structured_output:1".to_string());
        }
        let prefers_agentic = agentic_matches >= 2;

        let reasoning = format!(
            "score={score:.2} confidence={confidence:.2} tier={} signals=[{}]",
            tier.map_or("ambiguous", |t| t.as_str()),
            signals.iter().cloned().collect::<Vec<_>>().join(", ")
        );

        ScoringResult {
            score,
            confidence,
            tier,
            signals,
            reasoning,
            override_applied,
            prefers_agentic,
        }
    }

    /// 计算全部15个维度
    fn score_dimensions(&self, scan: &str, approx_tokens: usize) -> Vec<DimensionScore> {
        let s = &self.signals;
        let cap = MATCH_CAP as f64;
        let positive = |name, weight, matches: usize| DimensionScore {
            name,
            weight,
            magnitude: matches as f64 / cap,
            matches,
        };
        let negative = |name, weight, matches: usize| DimensionScore {
            name,
            weight,
            magnitude: -(matches as f64 / cap),
            matches,
        };

        let reasoning = s.reasoning.count(scan);
        let code_fences = s.code_fence.find_iter(scan).count();
        let code = (s.code.count(scan) + code_fences).min(MATCH_CAP);
        let enumerations = s.enumeration.find_iter(scan).count();
        let multi_step = (s.multi_step.count(scan) + enumerations).min(MATCH_CAP);
        let agentic = s.agentic.count(scan);
        let technical = s.technical.count(scan);
        let creative = s.creative.count(scan);
        let questions = scan.matches('?').take(MATCH_CAP).count();
        let constraint = s.constraint.count(scan);
        let imperative = s.imperative.count(scan);
        let output = s.output.count(scan);
        let simple = s.simple.count(scan);
        let domain = s.domain.count(scan);
        let reference = s.reference.count(scan);
        let negation = s.negation.count(scan);

        // token数维度：过短降压，超长升压
        let token_magnitude = if approx_tokens < 50 {
            -1.0
        } else if approx_tokens > 500 {
            ((approx_tokens - 500) as f64 / 9_500.0).min(1.0)
        } else {
            0.0
        };

        vec![
            positive("reasoning", 0.18, reasoning),
            positive("code", 0.15, code),
            positive("multi_step", 0.12, multi_step),
            positive("agentic", 0.10, agentic),
            positive("technical", 0.10, technical),
            DimensionScore {
                name: "token_count",
                weight: 0.08,
                magnitude: token_magnitude,
                matches: usize::from(token_magnitude != 0.0),
            },
            negative("creative", 0.05, creative),
            positive("question", 0.05, questions),
            positive("constraint", 0.04, constraint),
            positive("imperative", 0.03, imperative),
            positive("output_format", 0.03, output),
            negative("simple", 0.02, simple),
            positive("domain", 0.02, domain),
            positive("reference", 0.02, reference),
            positive("negation", 0.01, negation),
        ]
    }
}

/// 在不超过 `max_bytes` 的最近字符边界处截断
fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> PromptScorer {
        PromptScorer::new(&RoutingConfig::default())
    }

    #[test]
    fn empty_prompt_is_simple_at_full_confidence() {
        let result = scorer().classify("", "", 0);
        assert_eq!(result.tier, Some(Tier::Simple));
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn trivial_question_lands_in_simple() {
        let result = scorer().classify("What is 2+2?", "", 4);
        assert_eq!(result.tier, Some(Tier::Simple));
        assert!(result.confidence >= 0.9);
    }

    #[test]
    fn two_reasoning_markers_force_reasoning_tier() {
        let result = scorer().classify(
            "Prove that sqrt(2) is irrational, step by step.",
            "",
            12,
        );
        assert_eq!(result.tier, Some(Tier::Reasoning));
        assert!(result.confidence >= 0.97);
    }

    #[test]
    fn large_context_forces_complex() {
        let result = scorer().classify("summarize this", "", 150_000);
        assert_eq!(result.tier, Some(Tier::Complex));
        assert_eq!(result.override_applied, Some("large_context"));
    }

    #[test]
    fn structured_output_system_prompt_raises_to_medium() {
        let result = scorer().classify("What is 2+2?", "Respond only in JSON.", 4);
        assert!(result.tier >= Some(Tier::Medium));
        assert_eq!(result.override_applied, Some("structured_output"));
    }

    #[test]
    fn agentic_signals_set_preference() {
        let result = scorer().classify(
            "Run the tests, fix the failures, then commit and push the branch.",
            "",
            20,
        );
        assert!(result.prefers_agentic);
    }

    #[test]
    fn scorer_is_pure() {
        let s = scorer();
        let a = s.classify("Refactor this function to use async I/O", "", 40);
        let b = s.classify("Refactor this function to use async I/O", "", 40);
        assert_eq!(a.score, b.score);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.tier, b.tier);
        assert_eq!(a.signals, b.signals);
    }

    #[test]
    fn truncation_keeps_char_boundary() {
        let text = "日本語テキスト".repeat(100);
        let truncated = truncate_to_char_boundary(&text, 100);
        assert!(truncated.len() <= 100);
        assert!(!truncated.is_empty());
    }

    #[test]
    fn long_prompt_scan_is_truncated() {
        let mut config = RoutingConfig::default();
        config.max_scan_chars = 50;
        let scorer = PromptScorer::new(&config);
        // 关键词全部落在截断点之后，不应计入
        let prompt = format!("{} prove theorem prove theorem", "x".repeat(60));
        let result = scorer.classify(&prompt, "", 30);
        assert_ne!(result.tier, Some(Tier::Reasoning));
    }
}
