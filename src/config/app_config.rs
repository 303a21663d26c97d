//! # 应用配置结构定义

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP 监听配置
    pub server: ServerConfig,
    /// 路由与分类器配置
    pub routing: RoutingConfig,
    /// 请求去重配置
    pub dedup: DedupConfig,
    /// 会话固定配置
    pub session: SessionConfig,
    /// SSE 心跳配置
    pub heartbeat: HeartbeatConfig,
    /// 降级链配置
    pub fallback: FallbackConfig,
    /// 上游提供商列表
    pub providers: Vec<ProviderConfig>,
    /// 用量记录配置
    pub usage: UsageConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP监听地址
    pub host: String,
    /// HTTP监听端口
    pub port: u16,
    /// 单请求整体超时（毫秒），覆盖整个降级循环
    pub request_timeout_ms: u64,
    /// 请求体大小上限（字节）
    pub max_body_bytes: usize,
    /// `/health` 返回的网关标识
    pub identity: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8402,
            request_timeout_ms: 180_000,
            max_body_bytes: 4 * 1024 * 1024,
            identity: "ai-gateway".to_string(),
        }
    }
}

/// 路由与分类器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// 分类器返回层级所需的最低置信度
    pub confidence_threshold: f64,
    /// 推理信号覆盖触发时的置信度下限
    pub reasoning_confidence: f64,
    /// 超过该token数强制 COMPLEX 层级
    pub large_context_tokens: usize,
    /// 结构化输出系统提示是否至少提升到 MEDIUM
    pub structured_output: bool,
    /// 分类器置信度不足时使用的默认层级
    pub default_tier: String,
    /// 节省率计算的基准模型
    pub baseline_model: String,
    /// 逻辑斯蒂校准斜率 k
    pub calibration_k: f64,
    /// 逻辑斯蒂校准中点
    pub calibration_midpoint: f64,
    /// 关键词统计的最大扫描字符数（token估算仍使用全长）
    pub max_scan_chars: usize,
    /// 各层级的主模型与降级列表
    pub tiers: TierTable,
    /// 评分关键词组覆盖（缺省使用内置词表）
    pub scoring: ScoringKeywords,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            reasoning_confidence: 0.97,
            large_context_tokens: 100_000,
            structured_output: true,
            default_tier: "medium".to_string(),
            baseline_model: "openai/gpt-4o".to_string(),
            calibration_k: 8.0,
            calibration_midpoint: 0.5,
            max_scan_chars: 16_384,
            tiers: TierTable::default(),
            scoring: ScoringKeywords::default(),
        }
    }
}

/// 四个层级的模型表
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    pub simple: TierModels,
    pub medium: TierModels,
    pub complex: TierModels,
    pub reasoning: TierModels,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            simple: TierModels {
                primary: "openai/gpt-4o-mini".to_string(),
                fallback: vec![
                    "google/gemini-2.0-flash".to_string(),
                    "anthropic/claude-3-5-haiku".to_string(),
                ],
            },
            medium: TierModels {
                primary: "anthropic/claude-3-5-sonnet".to_string(),
                fallback: vec![
                    "openai/gpt-4o".to_string(),
                    "google/gemini-1.5-pro".to_string(),
                ],
            },
            complex: TierModels {
                primary: "anthropic/claude-3-7-sonnet".to_string(),
                fallback: vec![
                    "openai/gpt-4.1".to_string(),
                    "google/gemini-2.5-pro".to_string(),
                ],
            },
            reasoning: TierModels {
                primary: "openai/o3-mini".to_string(),
                fallback: vec![
                    "deepseek/deepseek-r1".to_string(),
                    "anthropic/claude-3-7-sonnet".to_string(),
                ],
            },
        }
    }
}

/// 单个层级的主模型与降级列表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TierModels {
    pub primary: String,
    pub fallback: Vec<String>,
}

/// 评分关键词组覆盖
///
/// 每个字段为 None 时使用 `routing::signals` 的内置词表。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringKeywords {
    pub reasoning: Option<Vec<String>>,
    pub code: Option<Vec<String>>,
    pub simple: Option<Vec<String>>,
    pub multi_step: Option<Vec<String>>,
    pub technical: Option<Vec<String>>,
    pub creative: Option<Vec<String>>,
    pub domain: Option<Vec<String>>,
    pub agentic: Option<Vec<String>>,
    pub output: Option<Vec<String>>,
}

/// 请求去重配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// 完成态条目的保留时间（毫秒）
    pub ttl_ms: u64,
    /// 可缓存响应体的大小上限（字节）
    pub max_cached_body_bytes: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 30_000,
            max_cached_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// 会话固定配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 会话固定的保留时间（毫秒，按最后使用时间计）
    pub ttl_ms: u64,
    /// 过期清扫间隔（毫秒）
    pub cleanup_interval_ms: u64,
    /// 最大会话条目数，满时按最久未用淘汰
    pub max_entries: usize,
    /// 会话ID提取的请求头名称，按顺序取第一个非空值
    pub header_names: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 3_600_000,
            cleanup_interval_ms: 300_000,
            max_entries: 10_000,
            header_names: vec![
                "x-session-id".to_string(),
                "x-conversation-id".to_string(),
            ],
        }
    }
}

/// SSE 心跳配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// 心跳帧发送间隔（毫秒）
    pub interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_ms: 2_000 }
    }
}

/// 降级链配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// 单请求最多尝试的模型数
    pub max_attempts: usize,
    /// 候选链为空时追加的兜底模型
    pub last_resort: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            last_resort: "openai/gpt-4o-mini".to_string(),
        }
    }
}

/// 认证方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderAuthKind {
    /// 静态API密钥：`Authorization: <prefix><key>`
    ApiKey,
    /// 外部令牌：附加请求头并在401/402时通过钩子刷新
    Token,
}

impl Default for ProviderAuthKind {
    fn default() -> Self {
        Self::ApiKey
    }
}

/// 单个上游提供商配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// 提供商唯一标识
    pub id: String,
    /// 认证方式
    #[serde(default)]
    pub kind: ProviderAuthKind,
    /// 调度优先级，越大越优先
    #[serde(default)]
    pub priority: i32,
    /// 上游基础URL（OpenAI兼容）
    pub base_url: String,
    /// API密钥（kind = api_key 时必填）
    #[serde(default)]
    pub api_key: Option<String>,
    /// Authorization 前缀
    #[serde(default = "default_auth_prefix")]
    pub auth_prefix: String,
    /// 附加请求头
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    /// 该提供商可服务的模型列表；None 表示服务目录中同族的全部模型
    #[serde(default)]
    pub models: Option<Vec<String>>,
}

fn default_auth_prefix() -> String {
    "Bearer ".to_string()
}

/// 用量记录配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// 按天分文件的JSONL输出目录；None 表示仅维护内存聚合
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.routing.confidence_threshold) {
            return Err("routing.confidence_threshold 必须在 [0,1] 区间".to_string());
        }
        if !(0.0..=1.0).contains(&self.routing.reasoning_confidence) {
            return Err("routing.reasoning_confidence 必须在 [0,1] 区间".to_string());
        }
        if self.fallback.max_attempts == 0 {
            return Err("fallback.max_attempts 必须大于 0".to_string());
        }
        if self.fallback.last_resort.is_empty() || self.fallback.last_resort == "auto" {
            return Err("fallback.last_resort 必须为具体模型".to_string());
        }

        for tier in [
            &self.routing.tiers.simple,
            &self.routing.tiers.medium,
            &self.routing.tiers.complex,
            &self.routing.tiers.reasoning,
        ] {
            if tier.primary.is_empty() {
                return Err("routing.tiers 的 primary 不能为空".to_string());
            }
            if tier.primary == "auto" || tier.fallback.iter().any(|m| m == "auto") {
                return Err("routing.tiers 不能引用合成模型 auto".to_string());
            }
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.id.is_empty() {
                return Err("providers[].id 不能为空".to_string());
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(format!("重复的提供商ID: {}", provider.id));
            }
            if provider.kind == ProviderAuthKind::ApiKey && provider.api_key.is_none() {
                return Err(format!("提供商 {} 缺少 api_key", provider.id));
            }
        }

        if self.session.header_names.is_empty() {
            return Err("session.header_names 至少需要一个请求头名称".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_auto_in_tiers() {
        let mut config = AppConfig::default();
        config.routing.tiers.simple.primary = "auto".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_provider_ids() {
        let mut config = AppConfig::default();
        let provider = ProviderConfig {
            id: "p1".to_string(),
            kind: ProviderAuthKind::ApiKey,
            priority: 0,
            base_url: "https://api.example.com/v1".to_string(),
            api_key: Some("sk-test".to_string()),
            auth_prefix: default_auth_prefix(),
            extra_headers: HashMap::new(),
            models: None,
        };
        config.providers = vec![provider.clone(), provider];
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip_with_defaults() {
        let toml_str = r#"
            [server]
            port = 9000

            [[providers]]
            id = "openai"
            base_url = "https://api.openai.com/v1"
            api_key = "sk-test"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.request_timeout_ms, 180_000);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].auth_prefix, "Bearer ");
        assert!(config.validate().is_ok());
    }
}
