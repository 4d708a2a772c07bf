use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use super::{ensure_success, ProviderAdapter, CHAT_TIMEOUT};
use crate::{
    error::AdapterError,
    models::{ChatMessage, ModelRecord, ProviderKind},
};

pub struct OpenAIAdapter {
    client: reqwest::Client,
    base: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelItem>,
}

#[derive(Deserialize)]
struct ModelItem {
    id: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIAdapter {
    pub fn new(client: reqwest::Client, base: String, api_key: &str) -> Self {
        Self {
            client,
            base,
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    async fn get_models(&self) -> Result<Vec<ModelRecord>, AdapterError> {
        let resp = self
            .client
            .get(format!("{}/v1/models", self.base))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .timeout(CHAT_TIMEOUT)
            .send()
            .await?;
        let list: ModelsResponse = ensure_success(resp).await?.json().await?;
        Ok(list
            .data
            .into_iter()
            .map(|m| ModelRecord::discovered(m.id.clone(), m.id))
            .collect())
    }

    async fn chat(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String, AdapterError> {
        let body = json!({
            "model": model_id,
            "messages": messages,
            "stream": false
        });
        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base))
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .timeout(CHAT_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let completion: CompletionResponse = ensure_success(resp).await?.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AdapterError::EmptyReply)
    }
}
