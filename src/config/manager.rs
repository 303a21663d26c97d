//! # 配置管理器
//!
//! 统一的配置加载接口：TOML 文件 + `GATEWAY_` 前缀环境变量覆盖

use std::collections::HashMap;
use std::env;
use std::path::Path;

use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};

use super::AppConfig;

/// 配置管理器
pub struct ConfigManager {
    config: AppConfig,
}

impl ConfigManager {
    /// 创建配置管理器
    ///
    /// 优先使用 `AI_GATEWAY_CONFIG_PATH` 指定的配置文件路径；
    /// 否则按 `config/config.{RUST_ENV}.toml` 查找。文件缺失时使用内置默认值，
    /// 这样二进制无需任何配置即可以内置目录启动。
    pub fn new() -> crate::error::Result<Self> {
        let config_file = env::var("AI_GATEWAY_CONFIG_PATH").unwrap_or_else(|_| {
            let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
            format!("config/config.{env}.toml")
        });

        Self::from_file(Path::new(&config_file))
    }

    /// 从指定文件创建配置管理器
    pub fn from_file(config_path: &Path) -> crate::error::Result<Self> {
        let mut config = if config_path.exists() {
            Self::load_config_file(config_path)?
        } else {
            lwarn!(
                "system",
                LogStage::Startup,
                LogComponent::Config,
                "config_missing",
                &format!(
                    "配置文件不存在: {}，使用内置默认配置",
                    config_path.display()
                )
            );
            AppConfig::default()
        };

        let env_overrides = Self::build_env_overrides();
        Self::apply_env_overrides(&mut config, &env_overrides)?;

        config
            .validate()
            .map_err(|e| crate::config_error!("配置验证失败: {e}"))?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "init_complete",
            "配置管理器初始化完成",
            listen = %format!("{}:{}", config.server.host, config.server.port),
            providers = config.providers.len(),
            env_overrides = env_overrides.len()
        );

        Ok(Self { config })
    }

    /// 直接由内存配置构造（测试用）
    pub fn from_config(config: AppConfig) -> crate::error::Result<Self> {
        config
            .validate()
            .map_err(|e| crate::config_error!("配置验证失败: {e}"))?;
        Ok(Self { config })
    }

    /// 获取当前配置
    #[must_use]
    pub fn get_config(&self) -> AppConfig {
        self.config.clone()
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> crate::error::Result<AppConfig> {
        let config_content = std::fs::read_to_string(path)
            .map_err(|e| crate::config_error!("读取配置文件失败: {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&config_content).map_err(|e| {
            crate::config_error!(
                "TOML解析失败 - 配置文件: {}, 详细错误: {}",
                path.display(),
                e
            )
        })?;

        Ok(config)
    }

    /// 构建环境变量覆盖映射
    ///
    /// 扫描所有以 `GATEWAY_` 开头的环境变量，转换为配置路径。
    /// 例如: `GATEWAY_SERVER_PORT -> server.port`
    fn build_env_overrides() -> HashMap<String, String> {
        let mut overrides = HashMap::new();

        for (key, value) in env::vars() {
            if let Some(config_key) = key.strip_prefix("GATEWAY_") {
                let config_path = config_key.to_lowercase().replace('_', ".");
                overrides.insert(config_path, value);
            }
        }

        ldebug!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "env_override_scan",
            &format!("发现 {} 个环境变量覆盖", overrides.len())
        );
        overrides
    }

    /// 应用环境变量覆盖
    fn apply_env_overrides(
        config: &mut AppConfig,
        overrides: &HashMap<String, String>,
    ) -> crate::error::Result<()> {
        for (path, value) in overrides {
            ldebug!(
                "system",
                LogStage::Configuration,
                LogComponent::Config,
                "apply_env_override",
                &format!(
                    "应用环境变量覆盖: {} = {}",
                    path,
                    if path.contains("key") || path.contains("secret") {
                        "***"
                    } else {
                        value
                    }
                )
            );

            Self::apply_override_to_config(config, path, value)?;
        }
        Ok(())
    }

    /// 将环境变量覆盖应用到配置对象
    fn apply_override_to_config(
        config: &mut AppConfig,
        path: &str,
        value: &str,
    ) -> crate::error::Result<()> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["server", "host"] => config.server.host = value.to_string(),
            ["server", "port"] => {
                config.server.port = value
                    .parse()
                    .map_err(|e| crate::config_error!("无效的监听端口: {value}: {e}"))?;
            }
            ["server", "request", "timeout", "ms"] | ["server", "timeout"] => {
                config.server.request_timeout_ms = value
                    .parse()
                    .map_err(|e| crate::config_error!("无效的请求超时: {value}: {e}"))?;
            }
            ["server", "identity"] => config.server.identity = value.to_string(),
            ["routing", "confidence", "threshold"] => {
                config.routing.confidence_threshold = value
                    .parse()
                    .map_err(|e| crate::config_error!("无效的置信度阈值: {value}: {e}"))?;
            }
            ["routing", "default", "tier"] => {
                config.routing.default_tier = value.to_string();
            }
            ["dedup", "ttl", "ms"] => {
                config.dedup.ttl_ms = value
                    .parse()
                    .map_err(|e| crate::config_error!("无效的去重TTL: {value}: {e}"))?;
            }
            ["session", "ttl", "ms"] => {
                config.session.ttl_ms = value
                    .parse()
                    .map_err(|e| crate::config_error!("无效的会话TTL: {value}: {e}"))?;
            }
            ["heartbeat", "interval", "ms"] => {
                config.heartbeat.interval_ms = value
                    .parse()
                    .map_err(|e| crate::config_error!("无效的心跳间隔: {value}: {e}"))?;
            }
            ["fallback", "max", "attempts"] => {
                config.fallback.max_attempts = value
                    .parse()
                    .map_err(|e| crate::config_error!("无效的降级次数上限: {value}: {e}"))?;
            }
            ["usage", "dir"] => {
                config.usage.dir = Some(value.into());
            }

            _ => {
                lwarn!(
                    "system",
                    LogStage::Configuration,
                    LogComponent::Config,
                    "unknown_env_override",
                    &format!("未知的配置路径，忽略环境变量覆盖: {path}")
                );
            }
        }

        Ok(())
    }
}
