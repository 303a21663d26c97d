//! # 统一日志工具模块
//!
//! 提供网关全链路的结构化日志工具：
//! - 请求级业务日志宏（携带 `request_id` / 阶段 / 组件）
//! - 日志系统初始化和环境配置
//! - 上游请求头的脱敏格式化

use std::collections::BTreeMap;
use std::env;

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// ================ 请求级业务日志工具 ================

/// 日志阶段枚举
#[derive(Debug, Clone, Copy)]
pub enum LogStage {
    RequestStart,
    Routing,
    RequestModify,
    UpstreamRequest,
    Response,
    ResponseFailure,
    Error,
    // 非请求上下文阶段
    Startup,
    Shutdown,
    Configuration,
    HealthCheck,
    BackgroundTask,
    Cache,
    Internal,
}

impl LogStage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RequestStart => "request_start",
            Self::Routing => "routing",
            Self::RequestModify => "request_modify",
            Self::UpstreamRequest => "upstream_request",
            Self::Response => "response",
            Self::ResponseFailure => "response_failure",
            Self::Error => "error",
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Configuration => "configuration",
            Self::HealthCheck => "health_check",
            Self::BackgroundTask => "background_task",
            Self::Cache => "cache",
            Self::Internal => "internal",
        }
    }
}

/// 组件枚举
#[derive(Debug, Clone, Copy)]
pub enum LogComponent {
    // --- 系统组件 ---
    Main,
    Config,
    Server,
    // --- 请求管线组件 ---
    Handler,
    Scorer,
    Selector,
    SessionStore,
    Dedup,
    Catalog,
    // --- 上游组件 ---
    Registry,
    Provider,
    Auth,
    Sse,
    // --- 旁路组件 ---
    Statistics,
    HealthChecker,
}

impl LogComponent {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::Server => "server",
            Self::Handler => "handler",
            Self::Scorer => "scorer",
            Self::Selector => "selector",
            Self::SessionStore => "session_store",
            Self::Dedup => "dedup",
            Self::Catalog => "catalog",
            Self::Registry => "registry",
            Self::Provider => "provider",
            Self::Auth => "auth",
            Self::Sse => "sse",
            Self::Statistics => "statistics",
            Self::HealthChecker => "health_checker",
        }
    }
}

/// 标准日志宏 - 信息级别
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr, $($rest:tt)*) => {
        tracing::info!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            operation = $operation,
            component = $component.as_str(),
            message = %$description,
            $($rest)*
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr) => {
        tracing::info!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            operation = $operation,
            component = $component.as_str(),
            message = %$description,
        )
    };
}

/// 标准日志宏 - 调试级别
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr, $($rest:tt)*) => {
        tracing::debug!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            operation = $operation,
            component = $component.as_str(),
            message = %$description,
            $($rest)*
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr) => {
        tracing::debug!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            operation = $operation,
            component = $component.as_str(),
            message = %$description,
        )
    };
}

/// 标准日志宏 - 警告级别
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr, $($rest:tt)*) => {
        tracing::warn!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            operation = $operation,
            component = $component.as_str(),
            message = %$description,
            $($rest)*
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr) => {
        tracing::warn!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            operation = $operation,
            component = $component.as_str(),
            message = %$description,
        )
    };
}

/// 标准日志宏 - 错误级别
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr, $($rest:tt)*) => {
        tracing::error!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            operation = $operation,
            component = $component.as_str(),
            message = %$description,
            $($rest)*
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr) => {
        tracing::error!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            operation = $operation,
            component = $component.as_str(),
            message = %$description,
        )
    };
}

// ================ 日志系统初始化 ================

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 默认日志级别
    pub default_level: String,
    /// 应用自身日志级别
    pub app_level: String,
}

impl LoggingConfig {
    /// 生产模式：info 级别，屏蔽依赖噪音
    #[must_use]
    pub fn production() -> Self {
        Self {
            default_level: "warn".to_string(),
            app_level: "info".to_string(),
        }
    }

    /// 开发模式：debug 级别
    #[must_use]
    pub fn development() -> Self {
        Self {
            default_level: "info".to_string(),
            app_level: "debug".to_string(),
        }
    }

    /// 测试模式：尽量安静
    #[must_use]
    pub fn testing() -> Self {
        Self {
            default_level: "error".to_string(),
            app_level: "warn".to_string(),
        }
    }

    /// 从 `LOG_MODE` 环境变量选择配置
    ///
    /// ```text
    /// environment:
    ///   - LOG_MODE=production   # 生产模式（默认）
    ///   - LOG_MODE=development  # 开发模式
    ///   - LOG_MODE=testing      # 测试模式
    /// ```
    #[must_use]
    pub fn from_env() -> Self {
        match env::var("LOG_MODE").ok().as_deref() {
            Some("development") => Self::development(),
            Some("testing") => Self::testing(),
            _ => Self::production(),
        }
    }

    /// 构建过滤器字符串
    #[must_use]
    pub fn build_filter(&self) -> String {
        format!("{},ai_gateway={}", self.default_level, self.app_level)
    }
}

/// 初始化日志系统
pub fn init_logging(log_level: Option<&String>) {
    let config = LoggingConfig::from_env();

    // 如果有传入的日志级别，覆盖默认级别
    let final_config = if let Some(level) = log_level {
        let mut config = config;
        config.app_level.clone_from(level);
        config
    } else {
        config
    };

    let filter_string = final_config.build_filter();

    // RUST_LOG 优先于构建出的配置
    let log_filter = env::var("RUST_LOG").unwrap_or(filter_string);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&log_filter).unwrap_or_else(|_| EnvFilter::default())
    });

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(tracing_subscriber::filter::FilterFn::new(|metadata| {
            // 过滤掉一些噪音日志
            !metadata.target().starts_with("h2::client")
                && !metadata.target().starts_with("hyper::")
                && !metadata.target().starts_with("tokio::runtime")
        }));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "log_init",
        &format!("日志系统已启动 - 过滤器: {log_filter}")
    );
}

// ================ 请求头格式化 ================

/// 格式化上游请求头为人类可读的字符串（带脱敏处理）
#[must_use]
pub fn format_headers_masked(headers: &[(String, String)]) -> String {
    let mut formatted = Vec::new();
    for (name, value) in headers {
        let masked = match name.to_ascii_lowercase().as_str() {
            "authorization" | "proxy-authorization" | "x-api-key" | "api-key" => {
                // 只保留前后少量字符，避免日志泄露敏感信息
                if value.len() > 16 {
                    format!(
                        "{}: {}...{}",
                        name,
                        &value[..8],
                        &value[value.len().saturating_sub(4)..]
                    )
                } else {
                    format!("{name}: ****")
                }
            }
            _ => format!("{name}: {value}"),
        };
        formatted.push(masked);
    }
    formatted.join(", ")
}

/// 将响应头转为有序映射（键小写，按字母序），便于日志与缓存复用
#[must_use]
pub fn headers_json_map(headers: &axum::http::HeaderMap) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (name, value) in headers {
        let key = name.as_str().to_ascii_lowercase();
        let value_str = value.to_str().unwrap_or("<binary>");
        map.insert(key, value_str.to_string());
    }
    map
}
