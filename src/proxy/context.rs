//! # 请求上下文

use std::time::Instant;

use crate::routing::RoutingDecision;

/// 单个请求的贯穿上下文
///
/// 生命周期与一次客户端请求一致；路由决策在降级触发时被更新。
#[derive(Debug)]
pub struct RequestContext {
    /// 请求ID（日志贯穿）
    pub request_id: String,
    /// 接收时刻（延迟统计基准）
    pub received_at: Instant,
    /// 入站是否要求流式
    pub client_wants_streaming: bool,
    /// 会话ID（若从请求头提取到）
    pub session_id: Option<String>,
    /// 路由决策；降级时更新 model 与 method
    pub decision: Option<RoutingDecision>,
    /// 实际发起的上游尝试次数
    pub attempts: usize,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            received_at: Instant::now(),
            client_wants_streaming: false,
            session_id: None,
            decision: None,
            attempts: 0,
        }
    }

    /// 已消耗的毫秒数
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.received_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
