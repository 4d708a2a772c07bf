use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/**
 * \brief 初始化 tracing 日志订阅者。
 * \param level 默认过滤级别；设置了 `RUST_LOG` 时以其为准。
 */
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}
