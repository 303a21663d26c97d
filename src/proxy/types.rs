//! # 聊天补全线型解析
//!
//! 入站请求体按 OpenAI 兼容子集解析。未知字段原样保留在 `body` 中透传。

use serde_json::Value;

use crate::error::Result;

/// 未声明 `max_tokens` 时的默认输出上限
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

/// 解析后的聊天补全请求
#[derive(Debug, Clone)]
pub struct ParsedChatRequest {
    /// 完整请求体；网关的改写直接作用于该值
    pub body: Value,
    /// 原始 `model` 字段
    pub model_raw: String,
    /// 入站的 `stream` 值（上游请求一律强制非流式）
    pub stream: bool,
    /// `max_tokens`（或 `max_completion_tokens`）
    pub max_tokens: u64,
    /// 是否携带 `tools`
    pub has_tools: bool,
    /// 最后一条用户消息的文本
    pub last_user_message: String,
    /// 第一条系统消息的文本
    pub first_system_message: String,
    /// 全部消息文本的字符总量（token估算输入）
    pub content_chars: usize,
}

/// 解析入站请求体
pub fn parse_chat_request(bytes: &[u8]) -> Result<ParsedChatRequest> {
    let body: Value = serde_json::from_slice(bytes)
        .map_err(|e| crate::invalid_request_error!("请求体不是合法JSON: {}", e))?;

    if !body.is_object() {
        return Err(crate::invalid_request_error!("请求体必须是JSON对象"));
    }

    let model_raw = body
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| crate::invalid_request_error!("缺少 model 字段"))?;

    let messages = body
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| crate::invalid_request_error!("缺少 messages 数组"))?;

    let stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let max_tokens = body
        .get("max_tokens")
        .or_else(|| body.get("max_completion_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_MAX_TOKENS);

    let has_tools = body
        .get("tools")
        .and_then(Value::as_array)
        .map_or(false, |tools| !tools.is_empty());

    let mut last_user_message = String::new();
    let mut first_system_message = String::new();
    let mut content_chars = 0usize;

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("");
        let text = content_text(message.get("content"));
        content_chars += text.chars().count();

        match role {
            "user" => last_user_message = text,
            "system" if first_system_message.is_empty() => first_system_message = text,
            _ => {}
        }
    }

    Ok(ParsedChatRequest {
        body,
        model_raw,
        stream,
        max_tokens,
        has_tools,
        last_user_message,
        first_system_message,
        content_chars,
    })
}

/// 在请求体中强制 `stream = false`（上游一律非流式，流式由网关合成）
pub fn force_non_streaming(body: &mut Value) {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("stream".to_string(), Value::Bool(false));
    }
}

/// 把消息 content 提取为纯文本
///
/// 兼容字符串形式与分段数组形式（`[{type:"text", text:...}]`）。
#[must_use]
pub fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| {
                part.get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use serde_json::json;

    #[test]
    fn parses_minimal_request() {
        let body = json!({
            "model": "auto",
            "messages": [{"role": "user", "content": "What is 2+2?"}]
        });
        let parsed = parse_chat_request(body.to_string().as_bytes()).unwrap();
        assert_eq!(parsed.model_raw, "auto");
        assert!(!parsed.stream);
        assert_eq!(parsed.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(parsed.last_user_message, "What is 2+2?");
        assert_eq!(parsed.content_chars, 12);
    }

    #[test]
    fn extracts_system_and_tools() {
        let body = json!({
            "model": "openai/gpt-4o",
            "messages": [
                {"role": "system", "content": "Respond in JSON"},
                {"role": "user", "content": "hi"}
            ],
            "tools": [{"type": "function", "function": {"name": "f"}}],
            "stream": true,
            "max_tokens": 128
        });
        let parsed = parse_chat_request(body.to_string().as_bytes()).unwrap();
        assert!(parsed.stream);
        assert!(parsed.has_tools);
        assert_eq!(parsed.max_tokens, 128);
        assert_eq!(parsed.first_system_message, "Respond in JSON");
    }

    #[test]
    fn multipart_content_is_joined() {
        let content = json!([
            {"type": "text", "text": "part one"},
            {"type": "image_url", "image_url": {"url": "https://x"}},
            {"type": "text", "text": "part two"}
        ]);
        assert_eq!(content_text(Some(&content)), "part one\npart two");
    }

    #[test]
    fn malformed_json_is_invalid_request() {
        let err = parse_chat_request(b"{not json").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    }

    #[test]
    fn missing_model_is_invalid_request() {
        let err = parse_chat_request(br#"{"messages":[]}"#).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    }

    #[test]
    fn force_non_streaming_overwrites() {
        let mut body = json!({"model": "auto", "messages": [], "stream": true});
        force_non_streaming(&mut body);
        assert_eq!(body["stream"], json!(false));
    }
}
