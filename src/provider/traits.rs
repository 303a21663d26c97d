//! # 提供商与认证策略特征
//!
//! 网关与上游交互的全部契约。提供商是封闭接口：固定的一小组操作，
//! `execute` 是唯一允许阻塞在网络上的操作。

use async_trait::async_trait;

use crate::error::Result;

use super::types::{ProviderResponse, UpstreamRequest};

/// 认证失败处理结果
#[derive(Debug, Clone)]
pub enum AuthFailureAction {
    /// 凭证无法恢复，终止该提供商的尝试
    Terminal,
    /// 凭证已刷新，用新请求头重试一次
    Retry { new_headers: Vec<(String, String)> },
}

/// 认证策略
///
/// 网关只通过两个动词与凭证交互：请求前派生请求头，
/// 以及可选的 401/402 失败钩子。策略自身不做网络外的状态假设。
#[async_trait]
pub trait AuthStrategy: Send + Sync + std::fmt::Debug {
    /// 策略名称（日志用）
    fn name(&self) -> &'static str;

    /// 为一次上游请求派生认证请求头；每次调用独立派生，不修改策略状态
    async fn prepare_headers(&self, request: &UpstreamRequest) -> Result<Vec<(String, String)>>;

    /// 上游返回 401/402 时的恢复钩子
    async fn handle_auth_failure(&self, _status: u16, _body: &[u8]) -> AuthFailureAction {
        AuthFailureAction::Terminal
    }
}

/// 上游提供商
///
/// 生命周期：启动时按配置实例化并注册一次；停机时 `cleanup`。
#[async_trait]
pub trait Provider: Send + Sync {
    /// 提供商唯一标识
    fn id(&self) -> &str;

    /// 调度优先级，越大越优先
    fn priority(&self) -> i32;

    /// 加载凭证等初始化；除单次有界握手外不得做阻塞I/O
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// 该提供商的权威模型列表（可以是目录的子集）
    fn list_models(&self) -> Vec<String>;

    /// 是否可服务指定模型
    fn is_available(&self, model_id: &str) -> bool;

    /// 执行上游请求；唯一允许阻塞在网络上的操作
    async fn execute(&self, request: &UpstreamRequest) -> ProviderResponse;

    /// 估算一次请求的费用（美元）
    fn estimate_cost(&self, request: &UpstreamRequest) -> f64;

    /// 健康检查；非权威，仅用于就绪报告，不参与路由
    async fn health_check(&self) -> bool {
        true
    }

    /// 透明转发任意路径（`/v1/*` 透传端点使用）
    async fn forward_raw(
        &self,
        method: axum::http::Method,
        path_and_query: &str,
        headers: Vec<(String, String)>,
        body: bytes::Bytes,
    ) -> ProviderResponse {
        let _ = (method, path_and_query, headers, body);
        ProviderResponse::network_failure("该提供商不支持透明转发")
    }

    /// 释放资源；幂等
    async fn cleanup(&self) {}
}

/// 余额策略
///
/// 外部协作方的抽象：可在请求前否决（余额不足），并接收乐观的
/// 开销通知。核心只依赖该接口，不关心钱包实现。
#[async_trait]
pub trait BalancePolicy: Send + Sync {
    /// 请求准入检查；Err(PaymentRequired) 表示否决
    async fn check(&self, request: &UpstreamRequest) -> Result<()>;

    /// 乐观通知一次预计开销
    async fn notify_spend(&self, _estimated_cost: f64) {}
}

/// 默认余额策略：放行一切
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBalancePolicy;

#[async_trait]
impl BalancePolicy for NoopBalancePolicy {
    async fn check(&self, _request: &UpstreamRequest) -> Result<()> {
        Ok(())
    }
}
