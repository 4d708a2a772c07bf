use std::sync::Arc;

use anyhow::Result;

use crate::{
    config::GatewayConfig,
    dispatch::Dispatcher,
    llm::AdapterPool,
    registry::{ModelRegistry, SqliteRegistry},
    transform::SystemClock,
};

/**
 * \brief 启动发现：重置注册表，登记启用的 Provider，拉取其模型并写入注册表。
 * \details 必须在开始监听前完成；单个 Provider 拉取失败只记录告警，不影响其他 Provider。
 * \return 为每个已登记 Provider 构建好的 Adapter 池。
 */
pub async fn discover(registry: &SqliteRegistry, config: &GatewayConfig) -> Result<AdapterPool> {
    registry.reset()?;
    let mut pool = AdapterPool::new();

    for settings in config.enabled_providers() {
        let provider = registry.add_provider(settings.kind, &settings.api_key, &settings.host, true)?;
        tracing::info!(provider = %provider.name, id = provider.id, host = %provider.host, "registered provider");

        let adapter = match pool.register(&provider) {
            Ok(adapter) => adapter,
            Err(err) => {
                tracing::warn!(provider = %provider.name, error = %err, "failed to build adapter");
                continue;
            }
        };

        let models = match adapter.get_models().await {
            Ok(models) => models,
            Err(err) => {
                tracing::warn!(provider = %provider.name, error = %err, "failed to fetch models");
                continue;
            }
        };

        for mut model in models {
            model.provider_id = provider.id;
            match registry.add_model(&model) {
                Ok(id) => {
                    tracing::debug!(provider = %provider.name, model = %model.model_id, id, "added model")
                }
                Err(err) => {
                    tracing::warn!(provider = %provider.name, model = %model.model_id, error = %err, "failed to add model")
                }
            }
        }
    }

    for provider in config.providers.iter().filter(|p| !p.enabled) {
        tracing::info!(
            "{} provider not enabled (IS_{}_ACTIVE is not set to 'true')",
            provider.kind,
            provider.kind.as_str().to_ascii_uppercase()
        );
    }

    Ok(pool)
}

/**
 * \brief 以生产依赖组装分发核心。
 */
pub fn build_dispatcher(registry: Arc<SqliteRegistry>, pool: AdapterPool) -> Dispatcher {
    Dispatcher::new(registry, Arc::new(pool), Arc::new(SystemClock::default()))
}
