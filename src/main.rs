//! # 智能LLM网关
//!
//! 进程入口：初始化日志与配置，组装网关并启动HTTP服务，
//! 收到中断信号后优雅停机。

use ai_gateway::logging::{LogComponent, LogStage};
use ai_gateway::{Gateway, linfo};

#[tokio::main]
async fn main() -> ai_gateway::Result<()> {
    ai_gateway::logging::init_logging(None);

    let config_manager = ai_gateway::config::ConfigManager::new()?;
    let config = config_manager.get_config();

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "starting",
        &format!(
            "ai-gateway v{} 启动中 - 监听 {}:{}",
            env!("CARGO_PKG_VERSION"),
            config.server.host,
            config.server.port
        )
    );

    let gateway = Gateway::builder(config).build().await?;
    gateway.run().await?;

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "exited",
        "网关已退出"
    );
    Ok(())
}
