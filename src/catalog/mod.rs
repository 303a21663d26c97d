//! # 模型目录模块
//!
//! 静态模型元数据表：价格、上下文窗口、能力标记，以及别名解析。
//! 目录在进程启动时构建一次，此后只读。

mod alias;

pub use alias::resolve_alias;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 合成模型ID：表示"由网关分类并选择"，绝不转发到上游
pub const AUTO_MODEL_ID: &str = "auto";

/// 模型能力标记
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// 深度推理（链式思考）能力
    pub reasoning: bool,
    /// 图像理解能力
    pub vision: bool,
    /// 工具调用/代理任务能力
    pub agentic: bool,
}

/// 模型元数据记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// 稳定标识，形如 `openai/gpt-4o`
    pub id: String,
    /// 展示名称
    pub display_name: String,
    /// 每百万输入token价格（美元）
    pub input_price_per_million: f64,
    /// 每百万输出token价格（美元）
    pub output_price_per_million: f64,
    /// 上下文窗口（token）
    pub context_window: usize,
    /// 最大输出（token）
    pub max_output: usize,
    /// 能力标记
    pub capabilities: ModelCapabilities,
}

impl ModelInfo {
    /// 提供商族（`/` 前的前缀）
    #[must_use]
    pub fn family(&self) -> &str {
        self.id.split('/').next().unwrap_or(&self.id)
    }

    /// 估算一次请求的费用（美元）
    #[must_use]
    pub fn estimate_cost(&self, input_tokens: usize, output_tokens: usize) -> f64 {
        let input = input_tokens as f64 / 1_000_000.0 * self.input_price_per_million;
        let output = output_tokens as f64 / 1_000_000.0 * self.output_price_per_million;
        input + output
    }
}

/// 模型目录
///
/// 不变式：ID 在目录内唯一；包含零价格的合成 `auto` 条目。
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: HashMap<String, ModelInfo>,
    order: Vec<String>,
}

impl ModelCatalog {
    /// 从模型列表构建目录
    ///
    /// # Panics
    /// 列表中出现重复ID时 panic（构建期不变式，而非运行时错误）。
    #[must_use]
    pub fn new(models: Vec<ModelInfo>) -> Self {
        let mut map = HashMap::with_capacity(models.len());
        let mut order = Vec::with_capacity(models.len());
        for model in models {
            let id = model.id.clone();
            assert!(
                map.insert(id.clone(), model).is_none(),
                "模型目录中出现重复ID: {id}"
            );
            order.push(id);
        }
        Self { models: map, order }
    }

    /// 内置目录：约30个模型，覆盖主流提供商族，外加合成 `auto`
    #[must_use]
    pub fn builtin() -> Self {
        let mut models = Vec::new();

        let mut push = |id: &str,
                        display_name: &str,
                        input: f64,
                        output: f64,
                        context_window: usize,
                        max_output: usize,
                        caps: ModelCapabilities| {
            models.push(ModelInfo {
                id: id.to_string(),
                display_name: display_name.to_string(),
                input_price_per_million: input,
                output_price_per_million: output,
                context_window,
                max_output,
                capabilities: caps,
            });
        };

        let chat = ModelCapabilities {
            reasoning: false,
            vision: false,
            agentic: true,
        };
        let chat_vision = ModelCapabilities {
            reasoning: false,
            vision: true,
            agentic: true,
        };
        let reasoning = ModelCapabilities {
            reasoning: true,
            vision: false,
            agentic: true,
        };
        let reasoning_vision = ModelCapabilities {
            reasoning: true,
            vision: true,
            agentic: true,
        };

        // 合成条目：由网关本地处理，零价格
        push(
            AUTO_MODEL_ID,
            "Auto (classify & route)",
            0.0,
            0.0,
            0,
            0,
            ModelCapabilities::default(),
        );

        // OpenAI
        push("openai/gpt-4o", "GPT-4o", 2.5, 10.0, 128_000, 16_384, chat_vision);
        push("openai/gpt-4o-mini", "GPT-4o mini", 0.15, 0.6, 128_000, 16_384, chat_vision);
        push("openai/gpt-4.1", "GPT-4.1", 2.0, 8.0, 1_047_576, 32_768, chat_vision);
        push("openai/gpt-4.1-mini", "GPT-4.1 mini", 0.4, 1.6, 1_047_576, 32_768, chat_vision);
        push("openai/gpt-4.1-nano", "GPT-4.1 nano", 0.1, 0.4, 1_047_576, 32_768, chat);
        push("openai/o3", "o3", 10.0, 40.0, 200_000, 100_000, reasoning_vision);
        push("openai/o3-mini", "o3-mini", 1.1, 4.4, 200_000, 100_000, reasoning);
        push("openai/o4-mini", "o4-mini", 1.1, 4.4, 200_000, 100_000, reasoning_vision);

        // Anthropic
        push("anthropic/claude-3-5-sonnet", "Claude 3.5 Sonnet", 3.0, 15.0, 200_000, 8_192, chat_vision);
        push("anthropic/claude-3-5-haiku", "Claude 3.5 Haiku", 0.8, 4.0, 200_000, 8_192, chat);
        push("anthropic/claude-3-7-sonnet", "Claude 3.7 Sonnet", 3.0, 15.0, 200_000, 64_000, reasoning_vision);
        push("anthropic/claude-sonnet-4", "Claude Sonnet 4", 3.0, 15.0, 200_000, 64_000, reasoning_vision);
        push("anthropic/claude-opus-4", "Claude Opus 4", 15.0, 75.0, 200_000, 32_000, reasoning_vision);

        // Google
        push("google/gemini-1.5-pro", "Gemini 1.5 Pro", 1.25, 5.0, 2_097_152, 8_192, chat_vision);
        push("google/gemini-1.5-flash", "Gemini 1.5 Flash", 0.075, 0.3, 1_048_576, 8_192, chat_vision);
        push("google/gemini-2.0-flash", "Gemini 2.0 Flash", 0.1, 0.4, 1_048_576, 8_192, chat_vision);
        push("google/gemini-2.5-pro", "Gemini 2.5 Pro", 1.25, 10.0, 1_048_576, 65_536, reasoning_vision);
        push("google/gemini-2.5-flash", "Gemini 2.5 Flash", 0.3, 2.5, 1_048_576, 65_536, reasoning_vision);

        // DeepSeek
        push("deepseek/deepseek-chat", "DeepSeek V3", 0.27, 1.1, 65_536, 8_192, chat);
        push("deepseek/deepseek-r1", "DeepSeek R1", 0.55, 2.19, 65_536, 8_192, reasoning);

        // Meta Llama
        push("meta-llama/llama-3.1-8b-instruct", "Llama 3.1 8B", 0.05, 0.08, 131_072, 8_192, chat);
        push("meta-llama/llama-3.1-70b-instruct", "Llama 3.1 70B", 0.59, 0.79, 131_072, 8_192, chat);
        push("meta-llama/llama-3.3-70b-instruct", "Llama 3.3 70B", 0.59, 0.79, 131_072, 8_192, chat);

        // Mistral
        push("mistral/mistral-small", "Mistral Small", 0.1, 0.3, 32_768, 8_192, chat);
        push("mistral/mistral-large", "Mistral Large", 2.0, 6.0, 131_072, 8_192, chat);
        push("mistral/codestral", "Codestral", 0.3, 0.9, 262_144, 8_192, chat);

        // xAI
        push("xai/grok-2", "Grok 2", 2.0, 10.0, 131_072, 8_192, chat_vision);
        push("xai/grok-3", "Grok 3", 3.0, 15.0, 131_072, 16_384, chat);
        push("xai/grok-3-mini", "Grok 3 mini", 0.3, 0.5, 131_072, 16_384, reasoning);

        Self::new(models)
    }

    /// 按ID查找模型
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.get(id)
    }

    /// 目录中是否包含该ID
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    /// 全部模型（按注册顺序）
    pub fn all(&self) -> impl Iterator<Item = &ModelInfo> {
        self.order.iter().filter_map(|id| self.models.get(id))
    }

    /// 除合成 `auto` 外的全部模型（`/v1/models` 使用）
    pub fn without_synthetic(&self) -> impl Iterator<Item = &ModelInfo> {
        self.all().filter(|m| m.id != AUTO_MODEL_ID)
    }

    /// 模型数量（含合成条目）
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// 先别名解析再查找；返回解析后的规范ID
    #[must_use]
    pub fn resolve(&self, input: &str) -> Option<&ModelInfo> {
        let resolved = resolve_alias(input);
        self.models.get(resolved.as_ref())
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_contains_auto_with_zero_price() {
        let catalog = ModelCatalog::builtin();
        let auto = catalog.get(AUTO_MODEL_ID).unwrap();
        assert_eq!(auto.input_price_per_million, 0.0);
        assert_eq!(auto.output_price_per_million, 0.0);
    }

    #[test]
    fn builtin_covers_expected_families() {
        let catalog = ModelCatalog::builtin();
        let families: std::collections::HashSet<&str> = catalog
            .without_synthetic()
            .map(super::ModelInfo::family)
            .collect();
        for family in ["openai", "anthropic", "google", "deepseek", "meta-llama", "mistral", "xai"] {
            assert!(families.contains(family), "缺少提供商族: {family}");
        }
        assert!(catalog.len() >= 28);
    }

    #[test]
    fn without_synthetic_excludes_auto() {
        let catalog = ModelCatalog::builtin();
        assert!(catalog.without_synthetic().all(|m| m.id != AUTO_MODEL_ID));
    }

    #[test]
    #[should_panic(expected = "重复ID")]
    fn duplicate_ids_panic() {
        let model = ModelInfo {
            id: "x/y".to_string(),
            display_name: "x".to_string(),
            input_price_per_million: 1.0,
            output_price_per_million: 1.0,
            context_window: 1,
            max_output: 1,
            capabilities: ModelCapabilities::default(),
        };
        let _ = ModelCatalog::new(vec![model.clone(), model]);
    }

    #[test]
    fn cost_estimate_uses_both_prices() {
        let catalog = ModelCatalog::builtin();
        let model = catalog.get("openai/gpt-4o").unwrap();
        let cost = model.estimate_cost(1_000_000, 1_000_000);
        assert!((cost - 12.5).abs() < 1e-9);
    }
}
