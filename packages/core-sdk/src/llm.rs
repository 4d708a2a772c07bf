use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::{header::HeaderMap, Method};

use crate::{
    error::AdapterError,
    models::{ChatMessage, ModelRecord, ProviderConfig, ProviderKind},
};

pub mod anthropic;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAIAdapter;

/** \brief 模型列表与对话调用的固定超时。 */
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(30);
/** \brief 透传转发的固定超时。 */
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(120);

/**
 * \brief 原样转发给上游的请求。
 */
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    /** \brief 上游路径，如 "/api/chat" */
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/**
 * \brief 上游原样返回的响应。
 */
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/**
 * \brief 所有上游 Provider 的统一能力集合。
 * \details Adapter 从不重试，每次调用只发起一次上游请求。
 */
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /**
     * \brief 列出上游可用模型；无公开列表接口的 Provider 返回内置目录。
     */
    async fn get_models(&self) -> Result<Vec<ModelRecord>, AdapterError>;

    /**
     * \brief 非流式调用，返回唯一一条回复文本。
     */
    async fn chat(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String, AdapterError>;

    /**
     * \brief 字节级透传，仅原生格式 Provider 支持。
     */
    async fn forward_raw(&self, _request: RawRequest) -> Result<RawResponse, AdapterError> {
        Err(AdapterError::Unsupported(self.kind().to_string()))
    }
}

/**
 * \brief 为已解析的 Provider 提供 Adapter；分发核心通过构造函数注入。
 */
pub trait AdapterSource: Send + Sync {
    fn adapter_for(&self, provider: &ProviderConfig) -> Option<Arc<dyn ProviderAdapter>>;
}

/**
 * \brief 启动时按 Provider 构建一次的 Adapter 池，每个 Adapter 持有可复用的 HTTP 客户端。
 */
#[derive(Default, Clone)]
pub struct AdapterPool {
    adapters: HashMap<i64, Arc<dyn ProviderAdapter>>,
}

impl AdapterPool {
    pub fn new() -> Self {
        Self::default()
    }

    /**
     * \brief 为 Provider 构建 Adapter 并登记，返回该 Adapter。
     */
    pub fn register(&mut self, provider: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>, AdapterError> {
        let adapter = build_adapter(provider)?;
        self.adapters.insert(provider.id, adapter.clone());
        Ok(adapter)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl AdapterSource for AdapterPool {
    fn adapter_for(&self, provider: &ProviderConfig) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider.id).cloned()
    }
}

/**
 * \brief 按 Provider 类型构造具体 Adapter。
 */
pub fn build_adapter(provider: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>, AdapterError> {
    let client = http_client()?;
    let base = base_url(provider.name, &provider.host);
    let adapter: Arc<dyn ProviderAdapter> = match provider.name {
        ProviderKind::OpenAI => Arc::new(OpenAIAdapter::new(client, base, &provider.api_key)),
        ProviderKind::Anthropic => {
            Arc::new(AnthropicAdapter::new(client, base, &provider.api_key))
        }
        ProviderKind::Ollama => Arc::new(OllamaAdapter::new(client, base)),
    };
    Ok(adapter)
}

/**
 * \brief 各 Provider 的默认 API 基地址。
 */
pub fn default_host(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAI => "https://api.openai.com",
        ProviderKind::Anthropic => "https://api.anthropic.com",
        ProviderKind::Ollama => "http://localhost:11434",
    }
}

fn base_url(kind: ProviderKind, host: &str) -> String {
    let host = host.trim();
    if host.is_empty() {
        default_host(kind).to_string()
    } else {
        host.trim_end_matches('/').to_string()
    }
}

fn http_client() -> Result<reqwest::Client, AdapterError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| AdapterError::Network(e.to_string()))
}

/**
 * \brief 非 2xx 状态统一转换为 `AdapterError::Status`，携带上游响应体。
 */
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, AdapterError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(AdapterError::Status { status, body })
}
