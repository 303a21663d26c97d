//! # 路由不变式测试
//!
//! 分类器、选择器与别名解析的跨模块属性。

use std::sync::Arc;

use ai_gateway::catalog::{ModelCatalog, resolve_alias};
use ai_gateway::config::AppConfig;
use ai_gateway::routing::{
    ModelSelector, PromptScorer, SelectorConstraints, Tier, approx_tokens,
};

fn scorer() -> PromptScorer {
    PromptScorer::new(&AppConfig::default().routing)
}

fn selector() -> ModelSelector {
    let config = AppConfig::default();
    ModelSelector::new(
        Arc::new(ModelCatalog::builtin()),
        config.routing.tiers,
        &config.fallback,
    )
}

#[test]
fn alias_resolution_is_idempotent_for_catalog_and_arbitrary_input() {
    let catalog = ModelCatalog::builtin();
    let inputs: Vec<String> = catalog
        .all()
        .map(|m| m.id.clone())
        .chain(
            ["sonnet", "GPT", " flash ", "r1", "some/unknown", "AUTO", ""]
                .iter()
                .map(|s| (*s).to_string()),
        )
        .collect();

    for input in inputs {
        let once = resolve_alias(&input).into_owned();
        let twice = resolve_alias(&once).into_owned();
        assert_eq!(once, twice, "别名解析不幂等: {input:?}");
    }
}

#[test]
fn scorer_tier_scenarios() {
    let scorer = scorer();
    let classify = |prompt: &str| {
        let tokens = approx_tokens(prompt.chars().count());
        scorer.classify(prompt, "", tokens)
    };

    // 简单问答
    let simple = classify("What is the capital of France?");
    assert_eq!(simple.tier, Some(Tier::Simple));

    // 推理信号覆盖
    let reasoning = classify("Prove that sqrt(2) is irrational, step by step.");
    assert_eq!(reasoning.tier, Some(Tier::Reasoning));
    assert!(reasoning.confidence >= 0.97);

    // 信号集合非空且可读
    assert!(reasoning.signals.iter().any(|s| s.starts_with("reasoning:")));
    assert!(!reasoning.reasoning.is_empty());
}

#[test]
fn scorer_is_deterministic_across_instances() {
    let a = scorer();
    let b = scorer();
    let prompt = "Refactor the database layer, then deploy and run the smoke tests";
    let tokens = approx_tokens(prompt.chars().count());

    let ra = a.classify(prompt, "", tokens);
    let rb = b.classify(prompt, "", tokens);
    assert_eq!(ra.score, rb.score);
    assert_eq!(ra.tier, rb.tier);
    assert_eq!(ra.signals, rb.signals);
}

#[test]
fn chains_are_bounded_nonempty_and_deterministic_for_all_tiers() {
    let selector = selector();
    let max_attempts = AppConfig::default().fallback.max_attempts;

    for tier in Tier::all() {
        for estimated_tokens in [0usize, 1_000, 150_000, 5_000_000] {
            for prefer_agentic in [false, true] {
                let constraints = SelectorConstraints {
                    estimated_tokens,
                    prefer_agentic,
                    session_pin: None,
                };
                let chain = selector.chain(tier, &constraints);
                assert!(!chain.is_empty(), "{tier} 链为空");
                assert!(chain.len() <= max_attempts);
                assert_eq!(chain, selector.chain(tier, &constraints));
                assert!(chain.iter().all(|m| m != "auto"));
            }
        }
    }
}

#[test]
fn agentic_preference_moves_capable_models_first() {
    let catalog = Arc::new(ModelCatalog::builtin());
    let selector = selector();
    let constraints = SelectorConstraints {
        estimated_tokens: 100,
        prefer_agentic: true,
        session_pin: None,
    };
    for tier in Tier::all() {
        let chain = selector.chain(tier, &constraints);
        let head = catalog.get(&chain[0]).unwrap();
        assert!(head.capabilities.agentic, "{tier} 链首非代理能力模型");
    }
}

#[test]
fn session_pin_survives_context_filter_only_when_it_fits() {
    let selector = selector();

    // 窗口足够：固定模型在链首
    let fits = selector.chain(
        Tier::Simple,
        &SelectorConstraints {
            estimated_tokens: 1_000,
            prefer_agentic: false,
            session_pin: Some("mistral/mistral-small".to_string()),
        },
    );
    assert_eq!(fits[0], "mistral/mistral-small");

    // 窗口不足（mistral-small 只有 32k）：固定模型被剔除
    let dropped = selector.chain(
        Tier::Simple,
        &SelectorConstraints {
            estimated_tokens: 100_000,
            prefer_agentic: false,
            session_pin: Some("mistral/mistral-small".to_string()),
        },
    );
    assert!(dropped.iter().all(|m| m != "mistral/mistral-small"));
}
