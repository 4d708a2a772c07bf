use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ensure_success, ProviderAdapter, CHAT_TIMEOUT};
use crate::{
    error::AdapterError,
    models::{ChatMessage, ModelRecord, ProviderKind, Role},
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/**
 * \brief Anthropic 没有公开的模型列表接口，使用内置目录。
 */
const CATALOG: [(&str, &str); 3] = [
    ("Claude 3 Opus", "claude-3-opus-20240229"),
    ("Claude 3 Sonnet", "claude-3-sonnet-20240229"),
    ("Claude 3 Haiku", "claude-3-haiku-20240307"),
];

pub struct AnthropicAdapter {
    client: reqwest::Client,
    base: String,
    api_key: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicAdapter {
    pub fn new(client: reqwest::Client, base: String, api_key: &str) -> Self {
        Self {
            client,
            base,
            api_key: api_key.to_string(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, AdapterError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| AdapterError::Config(format!("invalid api key header: {}", e)))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }
}

/**
 * \brief system 消息提升为顶层 `system` 字段，其余消息保留角色。
 */
fn anthropic_payload(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut items = Vec::new();
    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.clone()),
            Role::User | Role::Assistant => items.push(json!({
                "role": msg.role.as_str(),
                "content": msg.content
            })),
        }
    }
    let system_prompt = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system_prompt, items)
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn get_models(&self) -> Result<Vec<ModelRecord>, AdapterError> {
        Ok(CATALOG
            .iter()
            .map(|(name, id)| ModelRecord::discovered(*name, *id))
            .collect())
    }

    async fn chat(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String, AdapterError> {
        let (system_prompt, payload_messages) = anthropic_payload(messages);
        let mut body = json!({
            "model": model_id,
            "max_tokens": MAX_TOKENS,
            "messages": payload_messages,
        });
        if let Some(sys) = system_prompt {
            body["system"] = json!(sys);
        }

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base))
            .headers(self.headers()?)
            .timeout(CHAT_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let reply: MessagesResponse = ensure_success(resp).await?.json().await?;
        let text = reply
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>();
        if text.is_empty() {
            return Err(AdapterError::EmptyReply);
        }
        Ok(text.join(""))
    }
}
