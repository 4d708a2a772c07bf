use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Method;
use serde::Deserialize;

use crate::{
    error::GatewayError,
    llm::{AdapterSource, ProviderAdapter, RawRequest, RawResponse},
    models::{ChatMessage, ModelRecord, ProviderConfig, ProviderKind, Role, UnifiedChatResult},
    registry::ModelRegistry,
    transform::{self, ChatCompletion, Clock, GenerateReply, ModelInfo, ModelList, NativeChatReply, TagList},
};

/**
 * \brief 对话类入口，决定透传路径与翻译后的响应外形。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /** \brief POST /api/v1/chat/completions */
    ChatCompletions,
    /** \brief POST /api/chat */
    NativeChat,
    /** \brief POST /api/generate */
    Generate,
}

impl Endpoint {
    /**
     * \brief 透传时上游使用的路径（与调用方所用方言一致）。
     */
    pub fn upstream_path(&self) -> &'static str {
        match self {
            Endpoint::ChatCompletions => "/v1/chat/completions",
            Endpoint::NativeChat => "/api/chat",
            Endpoint::Generate => "/api/generate",
        }
    }
}

/**
 * \brief 一次分发的最终结果。
 */
#[derive(Debug)]
pub enum DispatchReply {
    Raw(RawResponse),
    Chat(ChatCompletion),
    NativeChat(NativeChatReply),
    Generate(GenerateReply),
}

impl IntoResponse for DispatchReply {
    fn into_response(self) -> Response {
        match self {
            DispatchReply::Raw(raw) => {
                let status = StatusCode::from_u16(raw.status).unwrap_or(StatusCode::BAD_GATEWAY);
                let mut resp = Response::new(Body::from(raw.body));
                *resp.status_mut() = status;
                if let Some(ct) = raw
                    .content_type
                    .and_then(|ct| HeaderValue::from_str(&ct).ok())
                {
                    resp.headers_mut().insert(header::CONTENT_TYPE, ct);
                }
                resp
            }
            DispatchReply::Chat(reply) => Json(reply).into_response(),
            DispatchReply::NativeChat(reply) => Json(reply).into_response(),
            DispatchReply::Generate(reply) => Json(reply).into_response(),
        }
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    model: String,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    // 接受但不生效：翻译路径始终非流式
    #[serde(default)]
    #[allow(dead_code)]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    system: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct ShowRequest {
    #[serde(default)]
    model: String,
}

/**
 * \brief 只解析出模型标识，不校验其余结构。
 * \details 请求体必须是 JSON 对象，且顶层 `model` 为字符串。
 */
pub fn extract_model(body: &[u8]) -> Result<String, GatewayError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
    value
        .as_object()
        .and_then(|obj| obj.get("model"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::InvalidRequest("missing or invalid model field".to_string()))
}

/**
 * \brief 过滤转发头部：去掉传输分帧与逐跳头部，缺省补齐 JSON Content-Type。
 */
pub fn forward_headers(headers: &HeaderMap) -> HeaderMap {
    const DROPPED: [&str; 10] = [
        "content-length",
        "host",
        "transfer-encoding",
        "connection",
        "keep-alive",
        "upgrade",
        "te",
        "trailer",
        "accept-encoding",
        "expect",
    ];
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let lower = name.as_str();
        if DROPPED.contains(&lower) || lower.starts_with("proxy-") {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    if !out.contains_key(header::CONTENT_TYPE) {
        out.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }
    out
}

/**
 * \brief 分发核心：注册表解析 → Adapter 选择 → 透传或翻译 → 响应转换。
 * \details 所有依赖经构造函数注入，测试可替换为假实现。
 */
pub struct Dispatcher {
    registry: Arc<dyn ModelRegistry>,
    adapters: Arc<dyn AdapterSource>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        adapters: Arc<dyn AdapterSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            adapters,
            clock,
        }
    }

    /**
     * \brief 模型标识 → (Provider, Adapter)。
     */
    pub fn resolve(
        &self,
        model_id: &str,
    ) -> Result<(ProviderConfig, Arc<dyn ProviderAdapter>), GatewayError> {
        let provider = self
            .registry
            .resolve_provider(model_id)?
            .ok_or_else(|| GatewayError::UnsupportedModel(model_id.to_string()))?;
        let adapter = self.adapters.adapter_for(&provider).ok_or_else(|| {
            GatewayError::Internal(format!("no adapter registered for provider {}", provider.name))
        })?;
        Ok((provider, adapter))
    }

    /**
     * \brief 处理一次对话类请求；请求体只读取一次，后续步骤均借用该缓冲区。
     */
    pub async fn dispatch(
        &self,
        endpoint: Endpoint,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<DispatchReply, GatewayError> {
        let model_id = extract_model(&body)?;
        let (provider, adapter) = self.resolve(&model_id)?;

        if provider.name.is_passthrough() {
            tracing::info!(model = %model_id, provider = %provider.name, path = endpoint.upstream_path(), "passthrough");
            let request = RawRequest {
                method: Method::POST,
                path: endpoint.upstream_path().to_string(),
                headers: forward_headers(headers),
                body,
            };
            let raw = adapter
                .forward_raw(request)
                .await
                .map_err(|source| GatewayError::Proxy {
                    provider: provider.name.to_string(),
                    source,
                })?;
            return Ok(DispatchReply::Raw(raw));
        }

        tracing::info!(model = %model_id, provider = %provider.name, "translate");
        let messages = parse_messages(endpoint, &body)?;
        let result = self.invoke(adapter.as_ref(), &model_id, &messages).await?;
        let clock = self.clock.as_ref();
        Ok(match endpoint {
            Endpoint::ChatCompletions => {
                DispatchReply::Chat(transform::to_chat_envelope(clock, &result.model_id, &result.text))
            }
            Endpoint::NativeChat => DispatchReply::NativeChat(transform::to_native_chat_envelope(
                clock,
                &result.model_id,
                &result.text,
            )),
            Endpoint::Generate => DispatchReply::Generate(transform::to_generate_envelope(
                clock,
                &result.model_id,
                &result.text,
            )),
        })
    }

    /**
     * \brief 经翻译路径执行一次对话（不透传），CLI 亦复用。
     */
    pub async fn chat(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
    ) -> Result<UnifiedChatResult, GatewayError> {
        let (_, adapter) = self.resolve(model_id)?;
        self.invoke(adapter.as_ref(), model_id, messages).await
    }

    async fn invoke(
        &self,
        adapter: &dyn ProviderAdapter,
        model_id: &str,
        messages: &[ChatMessage],
    ) -> Result<UnifiedChatResult, GatewayError> {
        let text = adapter
            .chat(model_id, messages)
            .await
            .map_err(GatewayError::Upstream)?;
        Ok(UnifiedChatResult {
            model_id: model_id.to_string(),
            text,
            completed: true,
        })
    }

    /**
     * \brief 注册表中全部启用模型，按 Provider 插入顺序排列。
     */
    pub fn catalog(&self) -> Result<Vec<(ProviderKind, ModelRecord)>, GatewayError> {
        let mut out = Vec::new();
        for provider in self.registry.active_providers()? {
            for model in self.registry.models_of(provider.id)? {
                if model.active {
                    out.push((provider.name, model));
                }
            }
        }
        Ok(out)
    }

    pub fn list_models(&self) -> Result<ModelList, GatewayError> {
        Ok(transform::to_model_list(&self.catalog()?))
    }

    pub fn list_tags(&self) -> Result<TagList, GatewayError> {
        Ok(transform::to_tag_list(&self.catalog()?))
    }

    /**
     * \brief /api/show：返回占位模型描述。
     */
    pub fn show_model(&self, body: &[u8]) -> Result<ModelInfo, GatewayError> {
        let req: ShowRequest = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
        if req.model.is_empty() {
            return Err(GatewayError::MissingModelName);
        }
        let provider = self
            .registry
            .resolve_provider(&req.model)?
            .ok_or(GatewayError::ModelNotFound)?;
        Ok(transform::to_model_info(provider.name))
    }
}

fn parse_messages(endpoint: Endpoint, body: &[u8]) -> Result<Vec<ChatMessage>, GatewayError> {
    let invalid = |e: serde_json::Error| GatewayError::InvalidRequest(e.to_string());
    match endpoint {
        Endpoint::ChatCompletions | Endpoint::NativeChat => {
            let req: ChatRequest = serde_json::from_slice(body).map_err(invalid)?;
            Ok(req.messages)
        }
        Endpoint::Generate => {
            let req: GenerateRequest = serde_json::from_slice(body).map_err(invalid)?;
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = req.system.filter(|s| !s.is_empty()) {
                messages.push(ChatMessage::new(Role::System, system));
            }
            messages.push(ChatMessage::new(Role::User, req.prompt));
            Ok(messages)
        }
    }
}
