//! # 评分信号词表
//!
//! 各评分维度的关键词组与匹配器。词表可经配置覆盖（§配置 `routing.scoring`），
//! 匹配统一为大小写不敏感、尽量按词边界。

use regex::{Regex, RegexBuilder};

use crate::config::ScoringKeywords;

/// 单维度匹配上限，防止长提示词把单一维度刷满
pub const MATCH_CAP: usize = 5;

// ---- 内置词表 ----

const REASONING_KEYWORDS: &[&str] = &[
    "prove", "proof", "theorem", "lemma", "derive", "deduce", "step by step",
    "step-by-step", "induction", "contradiction", "rigorous", "formally",
    "reason through", "chain of thought", "explain why", "why does",
];

const CODE_KEYWORDS: &[&str] = &[
    "function", "class", "implement", "refactor", "compile", "debug",
    "unit test", "algorithm", "stack trace", "regex", "struct", "async",
    "recursion", "pseudocode",
];

const SIMPLE_KEYWORDS: &[&str] = &[
    "what is", "who is", "when was", "define", "definition of", "meaning of",
    "how many", "capital of", "translate",
];

const MULTI_STEP_KEYWORDS: &[&str] = &[
    "first", "then", "next", "after that", "finally", "followed by",
    "in order", "subsequently",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "kubernetes", "docker", "database", "server", "latency", "deployment",
    "microservice", "cache", "queue", "thread", "concurrency", "tcp", "http",
    "api", "kernel", "pipeline", "throughput",
];

const CREATIVE_KEYWORDS: &[&str] = &[
    "story", "poem", "poetry", "fiction", "lyrics", "haiku", "screenplay",
    "once upon", "imagine a", "creative",
];

const DOMAIN_KEYWORDS: &[&str] = &[
    "quantum", "genomics", "cryptography", "topology", "compiler", "fpga",
    "blockchain", "reinforcement learning", "bayesian", "epidemiology",
];

const AGENTIC_KEYWORDS: &[&str] = &[
    "run", "deploy", "execute", "install", "fix", "patch", "delete", "rename",
    "commit", "push", "build", "restart", "create file", "edit the file",
    "open the file",
];

const OUTPUT_KEYWORDS: &[&str] = &[
    "json", "yaml", "xml", "csv", "schema", "markdown table", "bullet points",
    "output format",
];

// 以下维度不在配置暴露的词组集合内，始终使用内置词表
const CONSTRAINT_KEYWORDS: &[&str] = &[
    "at most", "at least", "no more than", "within", "o(n", "o(log",
    "complexity", "must not", "upper bound", "limit of",
];

const IMPERATIVE_KEYWORDS: &[&str] = &[
    "write", "create", "make", "generate", "list", "give me", "show me",
    "summarize", "compare",
];

const REFERENCE_KEYWORDS: &[&str] = &[
    "the docs", "documentation above", "as mentioned", "as before",
    "the previous", "refer to", "see above",
];

const NEGATION_KEYWORDS: &[&str] = &[
    "not", "never", "without", "don't", "do not", "avoid", "except", "unless",
];

/// 一组关键词与其编译好的匹配器
#[derive(Debug)]
pub struct SignalGroup {
    name: &'static str,
    regex: Regex,
}

impl SignalGroup {
    fn new(name: &'static str, keywords: &[String]) -> Self {
        // 词首/词尾为字母数字时加词边界；诸如 "o(n" 的关键词保持原样
        let alternatives: Vec<String> = keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| {
                let escaped = regex::escape(k);
                let starts_word = k.chars().next().is_some_and(char::is_alphanumeric);
                let ends_word = k.chars().last().is_some_and(char::is_alphanumeric);
                format!(
                    "{}{}{}",
                    if starts_word { r"\b" } else { "" },
                    escaped,
                    if ends_word { r"\b" } else { "" }
                )
            })
            .collect();
        let pattern = format!("(?:{})", alternatives.join("|"));
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|_| Regex::new("$^").expect("空匹配器"));
        Self { name, regex }
    }

    fn from_static(name: &'static str, keywords: &[&str]) -> Self {
        let owned: Vec<String> = keywords.iter().map(|s| (*s).to_string()).collect();
        Self::new(name, &owned)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// 统计命中次数，截断到 [`MATCH_CAP`]
    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        self.regex.find_iter(text).take(MATCH_CAP).count()
    }
}

/// 全部评分信号的集合
#[derive(Debug)]
pub struct SignalSet {
    pub reasoning: SignalGroup,
    pub code: SignalGroup,
    pub simple: SignalGroup,
    pub multi_step: SignalGroup,
    pub technical: SignalGroup,
    pub creative: SignalGroup,
    pub domain: SignalGroup,
    pub agentic: SignalGroup,
    pub output: SignalGroup,
    pub constraint: SignalGroup,
    pub imperative: SignalGroup,
    pub reference: SignalGroup,
    pub negation: SignalGroup,
    /// 围栏代码块
    pub code_fence: Regex,
    /// 行首编号列表（多步骤信号）
    pub enumeration: Regex,
    /// 系统提示的结构化输出特征
    pub structured_output: Regex,
}

impl SignalSet {
    /// 按配置覆盖构建信号集合；缺省项使用内置词表
    #[must_use]
    pub fn from_config(overrides: &ScoringKeywords) -> Self {
        let group = |name: &'static str,
                     custom: &Option<Vec<String>>,
                     builtin: &[&str]| match custom {
            Some(words) if !words.is_empty() => SignalGroup::new(name, words),
            _ => SignalGroup::from_static(name, builtin),
        };

        Self {
            reasoning: group("reasoning", &overrides.reasoning, REASONING_KEYWORDS),
            code: group("code", &overrides.code, CODE_KEYWORDS),
            simple: group("simple", &overrides.simple, SIMPLE_KEYWORDS),
            multi_step: group("multi_step", &overrides.multi_step, MULTI_STEP_KEYWORDS),
            technical: group("technical", &overrides.technical, TECHNICAL_KEYWORDS),
            creative: group("creative", &overrides.creative, CREATIVE_KEYWORDS),
            domain: group("domain", &overrides.domain, DOMAIN_KEYWORDS),
            agentic: group("agentic", &overrides.agentic, AGENTIC_KEYWORDS),
            output: group("output", &overrides.output, OUTPUT_KEYWORDS),
            constraint: SignalGroup::from_static("constraint", CONSTRAINT_KEYWORDS),
            imperative: SignalGroup::from_static("imperative", IMPERATIVE_KEYWORDS),
            reference: SignalGroup::from_static("reference", REFERENCE_KEYWORDS),
            negation: SignalGroup::from_static("negation", NEGATION_KEYWORDS),
            code_fence: Regex::new("```").expect("围栏匹配器"),
            enumeration: Regex::new(r"(?m)^\s*\d+[.)]\s").expect("编号列表匹配器"),
            structured_output: RegexBuilder::new(
                r"\b(?:json|yaml|xml)\b|\bschema\b|structured output|respond (?:only )?(?:in|with)",
            )
            .case_insensitive(true)
            .build()
            .expect("结构化输出匹配器"),
        }
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::from_config(&ScoringKeywords::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_case_insensitive_and_capped() {
        let set = SignalSet::default();
        assert_eq!(set.reasoning.count("Prove the THEOREM step by step"), 3);
        let spam = "prove ".repeat(20);
        assert_eq!(set.reasoning.count(&spam), MATCH_CAP);
    }

    #[test]
    fn word_boundaries_respected() {
        let set = SignalSet::default();
        // "running" 不应命中代理词 "run"
        assert_eq!(set.agentic.count("the running total"), 0);
        assert_eq!(set.agentic.count("run the tests"), 1);
    }

    #[test]
    fn enumeration_matches_numbered_lists() {
        let set = SignalSet::default();
        let text = "1. first\n2. second\n3) third\n";
        assert_eq!(set.enumeration.find_iter(text).count(), 3);
    }

    #[test]
    fn config_override_replaces_builtin() {
        let overrides = ScoringKeywords {
            reasoning: Some(vec!["frobnicate".to_string()]),
            ..Default::default()
        };
        let set = SignalSet::from_config(&overrides);
        assert_eq!(set.reasoning.count("please frobnicate this"), 1);
        assert_eq!(set.reasoning.count("prove the theorem"), 0);
    }

    #[test]
    fn structured_output_pattern() {
        let set = SignalSet::default();
        assert!(set.structured_output.is_match("Respond only in JSON"));
        assert!(set.structured_output.is_match("Return output matching the schema"));
        assert!(!set.structured_output.is_match("You are a helpful assistant"));
    }
}
