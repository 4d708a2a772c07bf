use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::{
    db,
    error::RegistryError,
    models::{ModelRecord, ProviderConfig, ProviderKind},
};

/**
 * \brief 模型注册表查询接口：模型标识 → 所属 Provider。
 * \details 启动发现阶段完成全部写入，请求期间只读。
 */
pub trait ModelRegistry: Send + Sync {
    /**
     * \brief 按插入顺序扫描启用的 Provider，返回第一个拥有该模型的 Provider。
     * \return `Ok(None)` 表示未找到（含空模型标识），存储失败为 `Err`。
     */
    fn resolve_provider(&self, model_id: &str) -> Result<Option<ProviderConfig>, RegistryError> {
        if model_id.is_empty() {
            return Ok(None);
        }
        for provider in self.active_providers()? {
            let owns = self
                .models_of(provider.id)?
                .iter()
                .any(|m| m.active && m.model_id == model_id);
            if owns {
                return Ok(Some(provider));
            }
        }
        Ok(None)
    }

    fn active_providers(&self) -> Result<Vec<ProviderConfig>, RegistryError>;

    fn models_of(&self, provider_id: i64) -> Result<Vec<ModelRecord>, RegistryError>;

    /**
     * \brief 仅供启动发现使用的写入路径。
     */
    fn add_model(&self, model: &ModelRecord) -> Result<i64, RegistryError>;
}

/**
 * \brief 基于 SQLite 的注册表实现。
 */
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
}

impl SqliteRegistry {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /**
     * \brief 打开内存数据库并完成迁移，测试与一次性 CLI 命令使用。
     */
    pub fn in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory().map_err(|e| RegistryError::Storage(e.to_string()))?;
        db::migrate(&conn)?;
        Ok(Self::new(conn))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, RegistryError> {
        self.conn
            .lock()
            .map_err(|_| RegistryError::Storage("registry connection poisoned".to_string()))
    }

    pub fn reset(&self) -> Result<(), RegistryError> {
        Ok(db::reset(&*self.lock()?)?)
    }

    pub fn add_provider(
        &self,
        kind: ProviderKind,
        api_key: &str,
        host: &str,
        active: bool,
    ) -> Result<ProviderConfig, RegistryError> {
        let id = db::insert_provider(&*self.lock()?, kind, api_key, host, active)?;
        Ok(ProviderConfig {
            id,
            name: kind,
            api_key: api_key.to_string(),
            host: host.to_string(),
            active,
        })
    }
}

impl ModelRegistry for SqliteRegistry {
    fn active_providers(&self) -> Result<Vec<ProviderConfig>, RegistryError> {
        Ok(db::list_active_providers(&*self.lock()?)?)
    }

    fn models_of(&self, provider_id: i64) -> Result<Vec<ModelRecord>, RegistryError> {
        Ok(db::list_models_by_provider(&*self.lock()?, provider_id)?)
    }

    fn add_model(&self, model: &ModelRecord) -> Result<i64, RegistryError> {
        Ok(db::add_model(&*self.lock()?, model)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(registry: &SqliteRegistry, kind: ProviderKind, active: bool, models: &[&str]) -> i64 {
        let provider = registry
            .add_provider(kind, "key", "http://upstream", active)
            .expect("add provider");
        for id in models {
            let mut record = ModelRecord::discovered(*id, *id);
            record.provider_id = provider.id;
            registry.add_model(&record).expect("add model");
        }
        provider.id
    }

    #[test]
    fn test_resolve_returns_owning_provider() {
        let registry = SqliteRegistry::in_memory().expect("registry");
        seed(&registry, ProviderKind::OpenAI, true, &["a-1"]);
        let b = seed(&registry, ProviderKind::Anthropic, true, &["b-1"]);

        let found = registry.resolve_provider("b-1").expect("resolve").unwrap();
        assert_eq!(found.id, b);
        assert_eq!(found.name, ProviderKind::Anthropic);
    }

    #[test]
    fn test_resolve_absent_or_empty_is_not_found() {
        let registry = SqliteRegistry::in_memory().expect("registry");
        seed(&registry, ProviderKind::OpenAI, true, &["a-1"]);
        assert!(registry.resolve_provider("").expect("resolve").is_none());
        assert!(registry.resolve_provider("unknown-xyz").expect("resolve").is_none());
        assert!(registry.resolve_provider("A-1").expect("resolve").is_none());
    }

    #[test]
    fn test_inactive_provider_is_skipped() {
        let registry = SqliteRegistry::in_memory().expect("registry");
        seed(&registry, ProviderKind::OpenAI, false, &["shared"]);
        let ollama = seed(&registry, ProviderKind::Ollama, true, &["shared"]);
        assert_eq!(registry.resolve_provider("shared").expect("resolve").unwrap().id, ollama);
    }

    #[test]
    fn test_collision_first_registered_wins() {
        let registry = SqliteRegistry::in_memory().expect("registry");
        let first = seed(&registry, ProviderKind::OpenAI, true, &["dup"]);
        seed(&registry, ProviderKind::Ollama, true, &["dup"]);
        assert_eq!(registry.resolve_provider("dup").expect("resolve").unwrap().id, first);
    }

    #[test]
    fn test_inactive_model_is_not_resolvable() {
        let registry = SqliteRegistry::in_memory().expect("registry");
        let pid = seed(&registry, ProviderKind::OpenAI, true, &[]);
        let mut record = ModelRecord::discovered("retired", "retired");
        record.provider_id = pid;
        record.active = false;
        registry.add_model(&record).expect("add");
        assert!(registry.resolve_provider("retired").expect("resolve").is_none());
    }

    #[test]
    fn test_storage_failure_is_distinct_from_not_found() {
        let registry = SqliteRegistry::in_memory().expect("registry");
        registry
            .lock()
            .expect("lock")
            .execute_batch("DROP TABLE models;")
            .expect("drop");
        seed(&registry, ProviderKind::OpenAI, true, &[]);
        assert!(matches!(
            registry.resolve_provider("a-1"),
            Err(RegistryError::Storage(_))
        ));
    }
}
