//! # 提供商类型定义
//!
//! 上游执行的请求/响应类型与失败分类。可重试与不可重试的区分承载降级语义。

use bytes::Bytes;
use serde::Serialize;

/// 发往上游的类型化请求
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// 目标模型ID（目录规范形式）
    pub model: String,
    /// 改写后的请求体（`stream` 已强制为 false）
    pub body: Bytes,
    /// 估算的输入token数
    pub estimated_input_tokens: usize,
    /// 请求声明的最大输出token数
    pub max_output_tokens: usize,
    /// 请求ID（日志贯穿）
    pub request_id: String,
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// 连接失败、超时等传输层错误
    Network,
    /// 凭证被上游拒绝
    Auth,
    /// 速率限制
    Rate,
    /// 容量不足 / 模型暂不可用
    Capacity,
    /// 计费 / 配额问题
    Billing,
    /// 其他
    Other,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Rate => "rate",
            Self::Capacity => "capacity",
            Self::Billing => "billing",
            Self::Other => "other",
        }
    }
}

/// 上游失败详情
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    /// HTTP状态码；传输层失败时为 None
    pub status: Option<u16>,
    /// 上游返回的响应体
    pub body: Bytes,
    /// 是否应换下一个候选模型重试
    pub retryable: bool,
    /// 失败类别
    pub kind: FailureKind,
}

/// 上游执行结果（标签变体，不用异常表达上游失败）
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    /// 上游成功响应
    Success {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    },
    /// 上游失败，已分类
    Failure(ProviderFailure),
}

impl ProviderResponse {
    /// 构造传输层失败
    #[must_use]
    pub fn network_failure(message: &str) -> Self {
        Self::Failure(ProviderFailure {
            status: None,
            body: Bytes::from(message.as_bytes().to_vec()),
            retryable: true,
            kind: FailureKind::Network,
        })
    }
}

/// 响应体中标识提供商侧故障的特征串（小写匹配）
const PROVIDER_ERROR_PATTERNS: &[(&str, FailureKind)] = &[
    ("rate limit", FailureKind::Rate),
    ("rate_limit", FailureKind::Rate),
    ("too many requests", FailureKind::Rate),
    ("billing", FailureKind::Billing),
    ("insufficient funds", FailureKind::Billing),
    ("insufficient_quota", FailureKind::Billing),
    ("quota exceeded", FailureKind::Billing),
    ("model unavailable", FailureKind::Capacity),
    ("model_not_available", FailureKind::Capacity),
    ("overloaded", FailureKind::Capacity),
    ("capacity", FailureKind::Capacity),
];

/// 按状态码与响应体对上游失败分类
///
/// 可重试：网络错误、5xx、429、或响应体命中提供商故障特征。
/// 其余4xx为调用方错误，立即失败不降级。
#[must_use]
pub fn classify_failure(status: Option<u16>, body: &[u8]) -> (bool, FailureKind) {
    let Some(status) = status else {
        return (true, FailureKind::Network);
    };

    if status == 429 {
        return (true, FailureKind::Rate);
    }
    if status >= 500 {
        let kind = if status == 502 || status == 503 || status == 529 {
            FailureKind::Capacity
        } else {
            FailureKind::Other
        };
        return (true, kind);
    }

    // 4xx：先看响应体是否命中提供商侧故障特征
    let text = String::from_utf8_lossy(body).to_lowercase();
    for (pattern, kind) in PROVIDER_ERROR_PATTERNS {
        if text.contains(pattern) {
            return (true, *kind);
        }
    }

    if status == 401 || status == 403 {
        return (false, FailureKind::Auth);
    }
    if status == 402 {
        return (true, FailureKind::Billing);
    }

    (false, FailureKind::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        assert_eq!(classify_failure(None, b""), (true, FailureKind::Network));
    }

    #[test]
    fn status_429_is_retryable_rate() {
        assert_eq!(classify_failure(Some(429), b"{}"), (true, FailureKind::Rate));
    }

    #[test]
    fn five_xx_is_retryable() {
        assert_eq!(classify_failure(Some(500), b""), (true, FailureKind::Other));
        assert_eq!(classify_failure(Some(503), b""), (true, FailureKind::Capacity));
    }

    #[test]
    fn body_pattern_upgrades_4xx_to_retryable() {
        let (retryable, kind) =
            classify_failure(Some(400), br#"{"error":"rate limit exceeded"}"#);
        assert!(retryable);
        assert_eq!(kind, FailureKind::Rate);

        let (retryable, kind) = classify_failure(Some(400), br#"{"error":"billing problem"}"#);
        assert!(retryable);
        assert_eq!(kind, FailureKind::Billing);
    }

    #[test]
    fn plain_4xx_is_terminal() {
        let (retryable, kind) = classify_failure(Some(400), br#"{"error":"invalid messages"}"#);
        assert!(!retryable);
        assert_eq!(kind, FailureKind::Other);
    }

    #[test]
    fn auth_failures_are_terminal_by_default() {
        assert_eq!(classify_failure(Some(401), b"{}"), (false, FailureKind::Auth));
    }
}
