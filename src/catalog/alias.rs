//! # 模型别名解析
//!
//! 把简短的人类可读名称映射到目录中的规范模型ID。
//! 解析规则：去空白、转小写、查表；查不到原样返回。

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

static ALIASES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Anthropic 家族
    map.insert("sonnet", "anthropic/claude-3-7-sonnet");
    map.insert("haiku", "anthropic/claude-3-5-haiku");
    map.insert("opus", "anthropic/claude-opus-4");
    map.insert("claude", "anthropic/claude-3-7-sonnet");

    // OpenAI 家族
    map.insert("gpt", "openai/gpt-4o");
    map.insert("gpt4", "openai/gpt-4o");
    map.insert("4o", "openai/gpt-4o");
    map.insert("4o-mini", "openai/gpt-4o-mini");
    map.insert("mini", "openai/gpt-4o-mini");
    map.insert("o3", "openai/o3");
    map.insert("o3-mini", "openai/o3-mini");

    // Google 家族
    map.insert("gemini", "google/gemini-2.5-pro");
    map.insert("flash", "google/gemini-2.0-flash");

    // 其他
    map.insert("deepseek", "deepseek/deepseek-chat");
    map.insert("r1", "deepseek/deepseek-r1");
    map.insert("llama", "meta-llama/llama-3.3-70b-instruct");
    map.insert("mistral", "mistral/mistral-large");
    map.insert("codestral", "mistral/codestral");
    map.insert("grok", "xai/grok-3");

    // 常见的无前缀具体ID
    map.insert("gpt-4o", "openai/gpt-4o");
    map.insert("gpt-4o-mini", "openai/gpt-4o-mini");
    map.insert("gpt-4.1", "openai/gpt-4.1");
    map.insert("claude-3-5-sonnet", "anthropic/claude-3-5-sonnet");
    map.insert("claude-3-7-sonnet", "anthropic/claude-3-7-sonnet");
    map.insert("gemini-2.0-flash", "google/gemini-2.0-flash");
    map.insert("deepseek-r1", "deepseek/deepseek-r1");

    map
});

/// 解析模型别名
///
/// 幂等：`resolve_alias(resolve_alias(x)) == resolve_alias(x)`。
/// 表中没有的输入按规范化形式（trim + 小写）原样返回。
#[must_use]
pub fn resolve_alias(input: &str) -> Cow<'_, str> {
    let normalized = input.trim().to_lowercase();
    if let Some(&canonical) = ALIASES.get(normalized.as_str()) {
        return Cow::Borrowed(canonical);
    }
    if normalized == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_short_names() {
        assert_eq!(resolve_alias("sonnet"), "anthropic/claude-3-7-sonnet");
        assert_eq!(resolve_alias("flash"), "google/gemini-2.0-flash");
        assert_eq!(resolve_alias("r1"), "deepseek/deepseek-r1");
    }

    #[test]
    fn trims_and_lowercases() {
        assert_eq!(resolve_alias("  Sonnet  "), "anthropic/claude-3-7-sonnet");
        assert_eq!(resolve_alias("OPENAI/GPT-4o"), "openai/gpt-4o");
    }

    #[test]
    fn passes_unknown_through() {
        assert_eq!(resolve_alias("openai/gpt-4o"), "openai/gpt-4o");
        assert_eq!(resolve_alias("some/unknown-model"), "some/unknown-model");
    }

    #[test]
    fn idempotent_for_all_table_entries() {
        for alias in super::ALIASES.keys() {
            let once = resolve_alias(alias).into_owned();
            let twice = resolve_alias(&once).into_owned();
            assert_eq!(once, twice, "别名解析不幂等: {alias}");
        }
    }
}
