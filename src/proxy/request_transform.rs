//! # 请求改写
//!
//! 转发前对请求体的两类规范化：
//! - 消息序列规范化：部分提供商族拒绝系统消息之后以非用户消息开头的序列
//! - 工具调用ID净化：上游只接受 `[A-Za-z0-9_-]`，且同一请求内映射必须一致

use std::collections::{HashMap, HashSet};

use serde_json::Value;

/// 拒绝前导非用户消息的提供商族
const LEADING_USER_FAMILIES: &[&str] = &["anthropic", "deepseek"];

/// 规范化时插入的占位用户消息内容
const CONTINUATION_PLACEHOLDER: &str = "(continuing conversation)";

/// 按目标模型做消息序列规范化
///
/// 若模型属于要求首条非系统消息为用户消息的提供商族，且序列不满足，
/// 则在首条非系统消息之前插入占位用户消息。幂等。
pub fn normalize_messages(body: &mut Value, model: &str) {
    let family = model.split('/').next().unwrap_or(model);
    if !LEADING_USER_FAMILIES.contains(&family) {
        return;
    }

    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };

    let first_non_system = messages
        .iter()
        .position(|m| m.get("role").and_then(Value::as_str) != Some("system"));

    let placeholder = serde_json::json!({
        "role": "user",
        "content": CONTINUATION_PLACEHOLDER,
    });

    match first_non_system {
        Some(index) => {
            let role = messages[index].get("role").and_then(Value::as_str);
            if role != Some("user") {
                messages.insert(index, placeholder);
            }
        }
        // 只有系统消息：补一条用户消息收尾
        None if !messages.is_empty() => messages.push(placeholder),
        None => {}
    }
}

/// 净化单个ID：合法字符集外的一律替换为下划线
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 同一请求内的ID净化映射
///
/// 同一原始ID始终映射到同一净化ID；不同原始ID净化后碰撞时，
/// 按首次出现顺序追加确定性后缀。
#[derive(Debug, Default)]
struct IdMapper {
    mapping: HashMap<String, String>,
    used: HashSet<String>,
}

impl IdMapper {
    fn resolve(&mut self, original: &str) -> String {
        if let Some(mapped) = self.mapping.get(original) {
            return mapped.clone();
        }

        let base = sanitize_id(original);
        let mut candidate = base.clone();
        let mut suffix = 2usize;
        while self.used.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.used.insert(candidate.clone());
        self.mapping.insert(original.to_string(), candidate.clone());
        candidate
    }
}

/// 净化请求中嵌入的全部工具调用ID
///
/// 覆盖三处：`messages[].tool_calls[].id`、`messages[].tool_call_id`、
/// 以及 Anthropic 风格的 `content[{type:"tool_use"|"tool_result"}]` ID字段。
/// 映射在整个请求内一致，保证 `tool_call_id` 仍指向产生它的 `tool_calls[].id`。
pub fn sanitize_tool_ids(body: &mut Value) {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };

    let mut mapper = IdMapper::default();

    for message in messages.iter_mut() {
        // OpenAI 风格：assistant 的 tool_calls
        if let Some(tool_calls) = message.get_mut("tool_calls").and_then(Value::as_array_mut) {
            for call in tool_calls.iter_mut() {
                rewrite_string_field(call, "id", &mut mapper);
            }
        }

        // OpenAI 风格：tool 消息的 tool_call_id
        rewrite_string_field(message, "tool_call_id", &mut mapper);

        // Anthropic 风格：content 分段中的 tool_use / tool_result
        if let Some(parts) = message.get_mut("content").and_then(Value::as_array_mut) {
            for part in parts.iter_mut() {
                match part.get("type").and_then(Value::as_str) {
                    Some("tool_use") => rewrite_string_field(part, "id", &mut mapper),
                    Some("tool_result") => {
                        rewrite_string_field(part, "tool_use_id", &mut mapper);
                    }
                    _ => {}
                }
            }
        }
    }
}

fn rewrite_string_field(value: &mut Value, field: &str, mapper: &mut IdMapper) {
    let Some(original) = value.get(field).and_then(Value::as_str).map(str::to_string) else {
        return;
    };
    let sanitized = mapper.resolve(&original);
    if sanitized != original {
        if let Some(obj) = value.as_object_mut() {
            obj.insert(field.to_string(), Value::String(sanitized));
        }
    }
}
