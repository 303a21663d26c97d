//! # 提供商模块
//!
//! 上游提供商的封闭契约、内置认证策略、OpenAI兼容实现与注册表

mod auth;
mod http;
mod registry;
mod traits;
mod types;

pub use auth::{ApiKeyAuth, StaticTokenSource, TokenAuth, TokenSource};
pub use http::OpenAiCompatProvider;
pub use registry::{ProviderHealth, ProviderRegistry};
pub use traits::{AuthFailureAction, AuthStrategy, BalancePolicy, NoopBalancePolicy, Provider};
pub use types::{FailureKind, ProviderFailure, ProviderResponse, UpstreamRequest, classify_failure};
