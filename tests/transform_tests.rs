//! # 请求/响应改写测试
//!
//! 思考标记剥除与SSE合成的观察契约。

use serde_json::json;

use ai_gateway::proxy::{strip_thinking, synthesize_chunks};

#[test]
fn thinking_markers_closed_set() {
    // XML式标签块（四种，大小写不敏感）
    for tag in ["think", "thinking", "thought", "antthinking"] {
        let input = format!("<{tag}>hidden reasoning</{tag}>answer");
        assert_eq!(strip_thinking(&input), "answer", "未剥除 <{tag}> 块");
        let upper = format!("<{}>hidden</{}>answer", tag.to_uppercase(), tag.to_uppercase());
        assert_eq!(strip_thinking(&upper), "answer");
    }

    // 独立的开/闭标签残留
    assert_eq!(strip_thinking("</thinking>only the tail"), "only the tail");

    // 全角竖线框定的块与残留令牌
    assert_eq!(
        strip_thinking("<｜thinking▁begin｜>x<｜thinking▁end｜>ok"),
        "ok"
    );
    assert_eq!(strip_thinking("ok<｜end▁of▁sentence｜>"), "ok");
}

#[test]
fn stripping_never_touches_regular_markup() {
    let content = "Use <b>bold</b> and `<div>` in HTML; 1 < 2 is true.";
    assert_eq!(strip_thinking(content), content);
}

#[test]
fn synthesized_stream_shape_matches_contract() {
    let upstream = json!({
        "id": "chatcmpl-abc",
        "object": "chat.completion",
        "created": 1_700_000_123,
        "model": "deepseek/deepseek-r1",
        "choices": [
            {
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "<think>hidden</think>Final answer."
                },
                "finish_reason": "stop"
            },
            {
                "index": 1,
                "message": {"role": "assistant", "content": "Second choice."},
                "finish_reason": "length"
            }
        ]
    });

    let frames = synthesize_chunks(&upstream);
    // 每个choice三帧
    assert_eq!(frames.len(), 6);

    for (i, frame) in frames.iter().enumerate() {
        let payload: serde_json::Value =
            serde_json::from_str(frame.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(payload["id"], "chatcmpl-abc", "frame {i}");
        assert_eq!(payload["object"], "chat.completion.chunk");
        assert_eq!(payload["created"], 1_700_000_123);
        assert_eq!(payload["model"], "deepseek/deepseek-r1");
    }

    // 第一个choice：角色/内容（已剥除思考）/结束
    let content_frame: serde_json::Value =
        serde_json::from_str(frames[1].trim_start_matches("data: ").trim()).unwrap();
    assert_eq!(content_frame["choices"][0]["delta"]["content"], "Final answer.");

    let finish_frame: serde_json::Value =
        serde_json::from_str(frames[2].trim_start_matches("data: ").trim()).unwrap();
    assert_eq!(finish_frame["choices"][0]["finish_reason"], "stop");

    // 第二个choice的索引与结束原因
    let second_finish: serde_json::Value =
        serde_json::from_str(frames[5].trim_start_matches("data: ").trim()).unwrap();
    assert_eq!(second_finish["choices"][0]["index"], 1);
    assert_eq!(second_finish["choices"][0]["finish_reason"], "length");
}
