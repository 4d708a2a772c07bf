use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;

use super::{ensure_success, ProviderAdapter, RawRequest, RawResponse, CHAT_TIMEOUT, FORWARD_TIMEOUT};
use crate::{
    error::AdapterError,
    models::{ChatMessage, ModelRecord, ProviderKind},
};

/**
 * \brief Ollama Adapter：原生格式 Provider，支持字节级透传。
 */
pub struct OllamaAdapter {
    client: reqwest::Client,
    base: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagItem>,
}

#[derive(Deserialize)]
struct TagItem {
    name: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatReplyMessage>,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: String,
}

impl OllamaAdapter {
    pub fn new(client: reqwest::Client, base: String) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn get_models(&self) -> Result<Vec<ModelRecord>, AdapterError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base))
            .timeout(CHAT_TIMEOUT)
            .send()
            .await?;
        let tags: TagsResponse = ensure_success(resp).await?.json().await?;
        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelRecord::discovered(m.name.clone(), m.name))
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
            .post(format!("{}/api/chat", self.base))
            .header(CONTENT_TYPE, "application/json")
            .timeout(CHAT_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let reply: ChatResponse = ensure_success(resp).await?.json().await?;
        reply
            .message
            .map(|m| m.content)
            .ok_or(AdapterError::EmptyReply)
    }

    /**
     * \brief 原样发送请求字节与头部，原样返回状态码、Content-Type 与响应字节；不解析 JSON。
     */
    async fn forward_raw(&self, request: RawRequest) -> Result<RawResponse, AdapterError> {
        let resp = self
            .client
            .request(request.method, format!("{}{}", self.base, request.path))
            .headers(request.headers)
            .timeout(FORWARD_TIMEOUT)
            .body(request.body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .map_err(|e| AdapterError::Network(e.to_string()))?;
        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use axum::body::Bytes;
    use mockito::Matcher;
    use reqwest::{header::HeaderMap, Method};

    fn adapter(url: String) -> OllamaAdapter {
        OllamaAdapter::new(reqwest::Client::new(), url)
    }

    #[tokio::test]
    async fn test_get_models_from_tags() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"llama3:8b","size":1},{"name":"qwen2:7b"}]}"#)
            .create_async()
            .await;

        let models = adapter(server.url()).get_models().await.expect("models");
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].model_id, "llama3:8b");
        assert_eq!(models[0].name, "llama3:8b");
    }

    #[tokio::test]
    async fn test_chat_disables_streaming() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"model": "llama3", "stream": false})))
            .with_status(200)
            .with_body(r#"{"model":"llama3","message":{"role":"assistant","content":"hey"},"done":true}"#)
            .create_async()
            .await;

        let reply = adapter(server.url())
            .chat("llama3", &[ChatMessage::new(Role::User, "hi")])
            .await
            .expect("chat");
        mock.assert_async().await;
        assert_eq!(reply, "hey");
    }

    #[tokio::test]
    async fn test_forward_raw_relays_bytes_and_status_verbatim() {
        let request_body = br#"{"model":"llama3","messages":[],"stream":true,"custom":{"x":1}}"#;
        let upstream_body = "{\"weird\" : 1,\n \"error\":\"model busy\"}\n";

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_header("x-trace", "abc")
            .match_body(Matcher::Exact(String::from_utf8_lossy(request_body).into_owned()))
            .with_status(503)
            .with_header("content-type", "application/x-ndjson")
            .with_body(upstream_body)
            .create_async()
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-trace", "abc".parse().expect("header"));
        let resp = adapter(server.url())
            .forward_raw(RawRequest {
                method: Method::POST,
                path: "/api/chat".to_string(),
                headers,
                body: Bytes::from_static(request_body),
            })
            .await
            .expect("forward");

        mock.assert_async().await;
        assert_eq!(resp.status, 503);
        assert_eq!(resp.content_type.as_deref(), Some("application/x-ndjson"));
        assert_eq!(resp.body.as_ref(), upstream_body.as_bytes());
    }

    #[tokio::test]
    async fn test_forward_raw_transport_failure() {
        let err = adapter("http://127.0.0.1:1".into())
            .forward_raw(RawRequest {
                method: Method::POST,
                path: "/api/chat".to_string(),
                headers: HeaderMap::new(),
                body: Bytes::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Network(_)));
    }
}
