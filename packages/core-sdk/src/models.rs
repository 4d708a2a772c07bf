use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/**
 * \brief 已知的上游 Provider 类型（封闭集合）。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    /** \brief 启动时按此顺序注册。 */
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::OpenAI,
        ProviderKind::Anthropic,
        ProviderKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        }
    }

    /**
     * \brief 是否原生使用网关的统一线格式，可直接字节转发。
     */
    pub fn is_passthrough(&self) -> bool {
        matches!(self, ProviderKind::Ollama)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!("unknown provider kind: {}", other)),
        }
    }
}

/**
 * \brief Provider 配置记录。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /** \brief 自增主键 */
    pub id: i64,
    /** \brief Provider 类型，同时也是唯一名称 */
    pub name: ProviderKind,
    /** \brief API Key（可为空，如本地 Ollama） */
    pub api_key: String,
    /** \brief API 基地址 */
    pub host: String,
    pub active: bool,
}

/**
 * \brief 从 Provider 发现的模型记录。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: i64,
    /** \brief 所属 Provider 主键 */
    pub provider_id: i64,
    /** \brief 展示名称 */
    pub name: String,
    /** \brief 客户端请求中使用的模型标识 */
    pub model_id: String,
    pub active: bool,
}

impl ModelRecord {
    /**
     * \brief 构造尚未入库的模型记录（id/provider_id 由注册表写入时补齐）。
     */
    pub fn discovered(name: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            id: 0,
            provider_id: 0,
            name: name.into(),
            model_id: model_id.into(),
            active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/**
 * \brief 消息结构，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /** \brief 角色：system/user/assistant */
    pub role: Role,
    /** \brief 内容 */
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/**
 * \brief 任意 Adapter 的 Chat 输出，转换器唯一消费的契约。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedChatResult {
    pub model_id: String,
    pub text: String,
    pub completed: bool,
}
