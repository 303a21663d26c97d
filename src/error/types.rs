//! # 错误类型定义

use axum::http::StatusCode;
use thiserror::Error;

/// 错误分类：决定日志级别与对客户端的暴露程度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 客户端错误（4xx，warn 级别）
    Client,
    /// 服务端错误（5xx，error 级别）
    Server,
}

/// 应用主要错误类型
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 配置相关错误
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 网络通信错误
    #[error("网络错误: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 认证和授权错误
    #[error("认证错误: {message}")]
    Auth {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 上游提供商错误
    #[error("上游提供商错误: {message}")]
    Provider {
        message: String,
        provider: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 余额不足 / 支付被拒
    #[error("余额校验失败: {message}")]
    PaymentRequired { message: String },

    /// 无效的客户端请求
    #[error("无效请求: {message}")]
    InvalidRequest { message: String },

    /// 请求体超限
    #[error("请求体过大: 超过 {limit_bytes} 字节")]
    PayloadTooLarge { limit_bytes: usize },

    /// 别名解析后仍未知的模型
    #[error("未知模型: {model}")]
    ModelNotFound { model: String },

    /// 速率限制错误
    #[error("速率限制: {message}")]
    RateLimit {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 网关错误（上游不可达或全部候选失败）
    #[error("网关错误: {message}")]
    BadGateway {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 请求整体超时
    #[error("请求超时: 超过 {timeout_ms}ms")]
    RequestTimeout { timeout_ms: u64 },

    /// 上游服务器不可用
    #[error("上游服务器不可用: {message}")]
    UpstreamNotAvailable {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 缓存相关错误
    #[error("缓存错误: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 会话存储错误
    #[error("会话错误: {message}")]
    Session { message: String },

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// IO相关错误
    #[error("IO错误: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// 服务器初始化错误
    #[error("服务器初始化错误: {message}")]
    ServerInit {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 服务器启动错误
    #[error("服务器启动错误: {message}")]
    ServerStart {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 统计收集错误
    #[error("统计收集错误: {message}")]
    Statistics {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl GatewayError {
    /// 映射到HTTP状态码
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } | Self::ModelNotFound { .. } => StatusCode::BAD_REQUEST,
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Network { .. }
            | Self::BadGateway { .. }
            | Self::Provider { .. }
            | Self::RequestTimeout { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamNotAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config { .. }
            | Self::Cache { .. }
            | Self::Session { .. }
            | Self::Internal { .. }
            | Self::Io { .. }
            | Self::Serialization { .. }
            | Self::ServerInit { .. }
            | Self::ServerStart { .. }
            | Self::Statistics { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 错误码（用于日志和错误响应的 `type` 字段）
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config_error",
            Self::Network { .. } => "network_error",
            Self::Auth { .. } => "auth_error",
            Self::Provider { .. } => "provider_error",
            Self::PaymentRequired { .. } => "payment_required",
            Self::InvalidRequest { .. } => "invalid_request_error",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::BadGateway { .. } => "provider_error",
            Self::RequestTimeout { .. } => "timeout_error",
            Self::UpstreamNotAvailable { .. } => "upstream_unavailable",
            Self::Cache { .. } => "cache_error",
            Self::Session { .. } => "session_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Serialization { .. } => "serialization_error",
            Self::ServerInit { .. } => "server_init_error",
            Self::ServerStart { .. } => "server_start_error",
            Self::Statistics { .. } => "statistics_error",
        }
    }

    /// 错误分类
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. }
            | Self::ModelNotFound { .. }
            | Self::Auth { .. }
            | Self::PaymentRequired { .. }
            | Self::PayloadTooLarge { .. }
            | Self::RateLimit { .. } => ErrorCategory::Client,
            _ => ErrorCategory::Server,
        }
    }

    /// 构造 OpenAI 兼容的 JSON 错误体
    #[must_use]
    pub fn to_error_body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_code(),
                "status": self.status_code().as_u16(),
            }
        })
    }

    // ---- 构造辅助函数 ----

    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn network<T: Into<String>>(message: T) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    pub fn network_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn auth<T: Into<String>>(message: T) -> Self {
        Self::Auth {
            message: message.into(),
            source: None,
        }
    }

    pub fn provider<T: Into<String>, P: Into<String>>(message: T, provider: P) -> Self {
        Self::Provider {
            message: message.into(),
            provider: provider.into(),
            source: None,
        }
    }

    pub fn payment_required<T: Into<String>>(message: T) -> Self {
        Self::PaymentRequired {
            message: message.into(),
        }
    }

    pub fn invalid_request<T: Into<String>>(message: T) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn payload_too_large(limit_bytes: usize) -> Self {
        Self::PayloadTooLarge { limit_bytes }
    }

    pub fn model_not_found<T: Into<String>>(model: T) -> Self {
        Self::ModelNotFound {
            model: model.into(),
        }
    }

    pub fn rate_limit<T: Into<String>>(message: T) -> Self {
        Self::RateLimit {
            message: message.into(),
            source: None,
        }
    }

    pub fn bad_gateway<T: Into<String>>(message: T) -> Self {
        Self::BadGateway {
            message: message.into(),
            source: None,
        }
    }

    pub fn bad_gateway_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::BadGateway {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    #[must_use]
    pub const fn request_timeout(timeout_ms: u64) -> Self {
        Self::RequestTimeout { timeout_ms }
    }

    pub fn upstream_not_available<T: Into<String>>(message: T) -> Self {
        Self::UpstreamNotAvailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn cache<T: Into<String>>(message: T) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    pub fn cache_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Cache {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn session<T: Into<String>>(message: T) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn serialization<T: Into<String>, E: Into<anyhow::Error>>(message: T, source: E) -> Self {
        Self::Serialization {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn server_init<T: Into<String>>(message: T) -> Self {
        Self::ServerInit {
            message: message.into(),
            source: None,
        }
    }

    pub fn server_init_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::ServerInit {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn server_start<T: Into<String>>(message: T) -> Self {
        Self::ServerStart {
            message: message.into(),
            source: None,
        }
    }

    pub fn server_start_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::ServerStart {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn statistics<T: Into<String>>(message: T) -> Self {
        Self::Statistics {
            message: message.into(),
            source: None,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
            source: e,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization("JSON处理失败", e)
    }
}
