pub mod config;
pub mod db;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod llm;
pub mod models;
pub mod registry;
pub mod server;
pub mod telemetry;
pub mod transform;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::config::GatewayConfig;
    pub use crate::discovery;
    pub use crate::dispatch::Dispatcher;
    pub use crate::error::GatewayError;
    pub use crate::llm::{AdapterPool, ProviderAdapter};
    pub use crate::models::{ChatMessage, ProviderKind, Role};
    pub use crate::registry::{ModelRegistry, SqliteRegistry};
    pub use crate::server;
    pub use crate::telemetry;
}
