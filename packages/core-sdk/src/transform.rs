use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::models::{ModelRecord, ProviderKind};

/**
 * \brief 时间源抽象，便于测试注入固定时钟。
 */
pub trait Clock: Send + Sync {
    /** \brief 当前墙钟时间（UTC）。 */
    fn now_utc(&self) -> OffsetDateTime;
    /** \brief 单调高精度读数（纳秒），进程内严格递增。 */
    fn monotonic_nanos(&self) -> u64;
}

static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

/**
 * \brief 系统时钟实现。
 */
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl Clock for SystemClock {
    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn monotonic_nanos(&self) -> u64 {
        let reading = PROCESS_START.elapsed().as_nanos() as u64;
        // 并发下两次读数可能相同，取 max(reading, last + 1)
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = reading.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerateReply {
    pub model: String,
    pub created_at: String,
    pub response: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NativeChatReply {
    pub model: String,
    pub created_at: String,
    pub message: AssistantMessage,
    pub done: bool,
}

fn assistant(text: &str) -> AssistantMessage {
    AssistantMessage {
        role: "assistant",
        content: text.to_string(),
    }
}

fn rfc3339(clock: &dyn Clock) -> String {
    clock
        .now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| EPOCH_TIMESTAMP.to_string())
}

/**
 * \brief 构造 OpenAI 风格的 chat.completion 响应。
 */
pub fn to_chat_envelope(clock: &dyn Clock, model_id: &str, text: &str) -> ChatCompletion {
    ChatCompletion {
        id: format!("chatcmpl-{}", clock.monotonic_nanos()),
        object: "chat.completion",
        created: clock.now_utc().unix_timestamp(),
        model: model_id.to_string(),
        choices: vec![Choice {
            index: 0,
            message: assistant(text),
            finish_reason: "stop",
        }],
        usage: Usage::default(),
    }
}

/**
 * \brief 构造 Ollama /api/generate 风格响应。
 */
pub fn to_generate_envelope(clock: &dyn Clock, model_id: &str, text: &str) -> GenerateReply {
    GenerateReply {
        model: model_id.to_string(),
        created_at: rfc3339(clock),
        response: text.to_string(),
        done: true,
    }
}

/**
 * \brief 构造 Ollama /api/chat 风格响应（非透传 Provider 经 /api/chat 调用时使用）。
 */
pub fn to_native_chat_envelope(clock: &dyn Clock, model_id: &str, text: &str) -> NativeChatReply {
    NativeChatReply {
        model: model_id.to_string(),
        created_at: rfc3339(clock),
        message: assistant(text),
        done: true,
    }
}

pub const EPOCH_TIMESTAMP: &str = "1970-01-01T00:00:00.000Z";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagList {
    pub models: Vec<TagEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagEntry {
    pub name: String,
    pub modified_at: &'static str,
    pub size: u64,
    pub digest: String,
}

pub fn to_model_list(models: &[(ProviderKind, ModelRecord)]) -> ModelList {
    ModelList {
        object: "list",
        data: models
            .iter()
            .map(|(kind, m)| ModelEntry {
                id: m.model_id.clone(),
                object: "model",
                created: 0,
                owned_by: kind.to_string(),
            })
            .collect(),
    }
}

pub fn to_tag_list(models: &[(ProviderKind, ModelRecord)]) -> TagList {
    TagList {
        models: models
            .iter()
            .map(|(_, m)| TagEntry {
                name: m.model_id.clone(),
                modified_at: EPOCH_TIMESTAMP,
                size: 0,
                digest: String::new(),
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelInfo {
    pub license: &'static str,
    pub modelfile: String,
    pub parameters: &'static str,
    pub template: &'static str,
    pub system: &'static str,
    pub details: ModelDetails,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelDetails {
    pub parent_model: String,
    pub format: &'static str,
    pub family: String,
    pub families: Vec<String>,
    pub parameter_size: &'static str,
    pub quantization_level: &'static str,
}

/**
 * \brief 上游不提供元数据时返回的占位模型描述。
 */
pub fn to_model_info(kind: ProviderKind) -> ModelInfo {
    ModelInfo {
        license: "Unknown",
        modelfile: format!("# Model information for {} model", kind),
        parameters: "N/A",
        template: "{{ .Prompt }}",
        system: "You are a helpful AI assistant.",
        details: ModelDetails {
            parent_model: String::new(),
            format: "gguf",
            family: kind.to_string(),
            families: vec![kind.to_string()],
            parameter_size: "unknown",
            quantization_level: "N/A",
        },
    }
}
