//! # 网关前端模块
//!
//! HTTP服务、聊天补全主管线与全部请求/响应改写

mod context;
pub mod handler;
mod request_transform;
mod response_transform;
mod server;
mod streaming;
mod types;

pub use context::RequestContext;
pub use request_transform::{normalize_messages, sanitize_tool_ids};
pub use response_transform::{
    DONE_FRAME, HEARTBEAT_FRAME, data_frame, error_frame, strip_thinking, synthesize_chunks,
};
pub use server::{Gateway, GatewayBuilder};
pub use streaming::{SseWriter, spawn_heartbeat};
pub use types::{
    DEFAULT_MAX_TOKENS, ParsedChatRequest, content_text, force_non_streaming, parse_chat_request,
};
