use anyhow::Result;
use rusqlite::{params, types::Type, Connection, ErrorCode, Row};
use std::{path::Path, thread, time::Duration};

use crate::models::{ModelRecord, ProviderConfig, ProviderKind};

/**
 * \brief 打开注册表数据库文件。
 * \param path SQLite 文件路径，如 "./llamagate.db"
 */
pub fn open_db(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/**
 * \brief 运行数据库迁移，创建 providers/models 表。
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS providers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            api_key TEXT NOT NULL DEFAULT '',
            host TEXT NOT NULL DEFAULT '',
            is_active BOOLEAN NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS models (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            provider_id INTEGER NOT NULL REFERENCES providers(id),
            name TEXT NOT NULL,
            model_id TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_models_provider ON models(provider_id);
        "#,
        )
    })?;
    Ok(())
}

/**
 * \brief 清空注册表并重建表结构；每次启动发现前调用，保证状态干净。
 */
pub fn reset(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        DROP TABLE IF EXISTS models;
        DROP TABLE IF EXISTS providers;
        "#,
        )
    })?;
    migrate(conn)
}

/**
 * \brief 新增 Provider，返回自增主键。
 */
pub fn insert_provider(
    conn: &Connection,
    kind: ProviderKind,
    api_key: &str,
    host: &str,
    active: bool,
) -> Result<i64> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO providers (name, api_key, host, is_active) VALUES (?1, ?2, ?3, ?4)",
            params![kind.as_str(), api_key, host, active],
        )
    })?;
    Ok(conn.last_insert_rowid())
}

fn map_provider(row: &Row<'_>) -> rusqlite::Result<ProviderConfig> {
    let name: String = row.get(1)?;
    let kind = name
        .parse::<ProviderKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?;
    Ok(ProviderConfig {
        id: row.get(0)?,
        name: kind,
        api_key: row.get(2)?,
        host: row.get(3)?,
        active: row.get(4)?,
    })
}

fn map_model(row: &Row<'_>) -> rusqlite::Result<ModelRecord> {
    Ok(ModelRecord {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        name: row.get(2)?,
        model_id: row.get(3)?,
        active: row.get(4)?,
    })
}

/**
 * \brief 按插入顺序列出所有启用的 Provider。
 */
pub fn list_active_providers(conn: &Connection) -> Result<Vec<ProviderConfig>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, api_key, host, is_active FROM providers WHERE is_active = 1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([], map_provider)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/**
 * \brief 写入一条发现到的模型，返回自增主键。
 */
pub fn add_model(conn: &Connection, model: &ModelRecord) -> Result<i64> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO models (provider_id, name, model_id, is_active) VALUES (?1, ?2, ?3, ?4)",
            params![model.provider_id, model.name, model.model_id, model.active],
        )
    })?;
    Ok(conn.last_insert_rowid())
}

/**
 * \brief 列出指定 Provider 的全部模型（含未启用）。
 */
pub fn list_models_by_provider(conn: &Connection, provider_id: i64) -> Result<Vec<ModelRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, provider_id, name, model_id, is_active FROM models WHERE provider_id=?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![provider_id], map_model)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/**
 * \brief 针对 SQLite 锁冲突的重试助手。
 * \details 捕获 `database is locked`/`database table is locked` 等错误并进行线性退避，最大尝试 6 次。
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    const MAX_RETRIES: usize = 5;
    let mut attempt = 0;
    loop {
        match action() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) && attempt < MAX_RETRIES =>
            {
                attempt += 1;
                thread::sleep(Duration::from_millis(200 * attempt as u64));
            }
            Err(e) => return Err(e.into()),
        }
    }
}
