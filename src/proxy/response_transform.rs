//! # 响应改写
//!
//! 思考标记剥除与 SSE 合成：上游固定返回非流式JSON，客户端要求流式时，
//! 由网关把完整响应合成为 `chat.completion.chunk` 事件流。

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde_json::{Value, json};

/// XML式思考标签块（四种标签，非贪婪，大小写不敏感，跨行）
static THINKING_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(
        r"<think>.*?</think>|<thinking>.*?</thinking>|<thought>.*?</thought>|<antthinking>.*?</antthinking>",
    )
    .case_insensitive(true)
    .dot_matches_new_line(true)
    .build()
    .expect("思考块匹配器")
});

/// 残留的独立开/闭思考标签
static THINKING_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"</?(?:think|thinking|thought|antthinking)>")
        .case_insensitive(true)
        .build()
        .expect("思考标签匹配器")
});

/// 全角竖线框定的思考块（部分模型产出，如 <｜…begin…｜>…<｜…end…｜>）
static FULLWIDTH_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"<｜[^｜]*begin[^｜]*｜>.*?<｜[^｜]*end[^｜]*｜>")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("全角思考块匹配器")
});

/// 残留的独立全角竖线令牌
static FULLWIDTH_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<｜[^｜]*｜>").expect("全角令牌匹配器"));

/// 剥除上游助手内容中的内部思考标记
///
/// 只作用于上游产出的助手内容；用户消息原样转发，绝不经过本函数。
#[must_use]
pub fn strip_thinking(content: &str) -> String {
    let pass1 = THINKING_BLOCKS.replace_all(content, "");
    let pass2 = THINKING_TAGS.replace_all(&pass1, "");
    let pass3 = FULLWIDTH_BLOCKS.replace_all(&pass2, "");
    let pass4 = FULLWIDTH_TOKENS.replace_all(&pass3, "");
    pass4.trim().to_string()
}

/// 把JSON编码为一个SSE数据帧
#[must_use]
pub fn data_frame(payload: &Value) -> String {
    format!("data: {payload}\n\n")
}

/// 终止帧
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// 心跳帧（SSE注释，客户端解析器直接忽略）
pub const HEARTBEAT_FRAME: &str = ": heartbeat\n\n";

/// 流式错误帧：已发送响应头后只能以数据帧形式交付错误
#[must_use]
pub fn error_frame(message: &str, status: Option<u16>) -> String {
    let mut error = json!({
        "message": message,
        "type": "provider_error",
    });
    if let Some(status) = status {
        error["status"] = json!(status);
    }
    data_frame(&json!({ "error": error }))
}

/// 把非流式上游响应合成为SSE事件序列
///
/// 每个choice固定三族事件：角色帧、内容帧（有工具调用时追加一帧）、
/// 结束帧；共享头部取自上游的 id/created/model。末尾不含 [DONE]，
/// 由调用方在全部choice之后写入。
#[must_use]
pub fn synthesize_chunks(upstream: &Value) -> Vec<String> {
    let id = upstream
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("chatcmpl-gateway");
    let created = upstream.get("created").and_then(Value::as_i64).unwrap_or(0);
    let model = upstream.get("model").and_then(Value::as_str).unwrap_or("");

    let chunk = |index: u64, delta: Value, finish_reason: Value| {
        data_frame(&json!({
            "id": id,
            "object": "chat.completion.chunk",
            "created": created,
            "model": model,
            "choices": [{
                "index": index,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        }))
    };

    let empty = Vec::new();
    let choices = upstream
        .get("choices")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let mut frames = Vec::with_capacity(choices.len() * 3 + 1);

    for (i, choice) in choices.iter().enumerate() {
        let index = i as u64;
        let message = choice.get("message").cloned().unwrap_or(Value::Null);

        // 1. 角色帧
        frames.push(chunk(index, json!({"role": "assistant"}), Value::Null));

        // 2. 内容帧（剥除思考标记）
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .map(strip_thinking)
            .unwrap_or_default();
        frames.push(chunk(index, json!({"content": content}), Value::Null));

        // 2b. 工具调用帧
        if let Some(tool_calls) = message.get("tool_calls").filter(|v| !v.is_null()) {
            frames.push(chunk(index, json!({"tool_calls": tool_calls}), Value::Null));
        }

        // 3. 结束帧
        let finish = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .unwrap_or("stop");
        frames.push(chunk(index, json!({}), json!(finish)));
    }

    frames
}
