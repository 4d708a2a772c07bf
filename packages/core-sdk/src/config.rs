use std::path::PathBuf;

use crate::{llm::default_host, models::ProviderKind};

/**
 * \brief 单个 Provider 的启动配置。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /** \brief `IS_<KIND>_ACTIVE=true` 时启用 */
    pub enabled: bool,
    pub api_key: String,
    pub host: String,
}

/**
 * \brief 网关运行配置，来源于环境变量（可由 .env 预先加载）。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub port: String,
    pub database_path: PathBuf,
    /** \brief 默认日志过滤级别，`RUST_LOG` 优先 */
    pub log_level: String,
    pub providers: Vec<ProviderSettings>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /**
     * \brief 通过注入的查找函数构建配置，便于测试。
     */
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let providers = ProviderKind::ALL
            .iter()
            .map(|kind| {
                let prefix = kind.as_str().to_ascii_uppercase();
                ProviderSettings {
                    kind: *kind,
                    enabled: get(&format!("IS_{}_ACTIVE", prefix), "false") == "true",
                    api_key: get(&format!("{}_API_KEY", prefix), ""),
                    host: get(&format!("{}_HOST", prefix), default_host(*kind)),
                }
            })
            .collect();

        Self {
            port: get("PORT", "8080"),
            database_path: PathBuf::from(get("DATABASE_PATH", "./llamagate.db")),
            log_level: get("LLAMAGATE_LOG", "info"),
            providers,
        }
    }

    pub fn addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled)
    }
}
