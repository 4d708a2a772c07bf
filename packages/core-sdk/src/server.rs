use std::{any::Any, sync::Arc};

use anyhow::Result;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{
    dispatch::{Dispatcher, Endpoint},
    error::GatewayError,
    transform::{ModelInfo, ModelList, TagList},
};

/** \brief 单个请求体的读取上限。 */
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

type AppState = Arc<Dispatcher>;

/**
 * \brief 构建网关路由：OpenAI 风格与 Ollama 风格接口并存。
 */
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tags", get(list_tags))
        .route("/api/show", post(show_model))
        .route("/api/chat", post(native_chat))
        .route("/api/generate", post(generate))
        .route("/api/v1/models", get(list_models))
        .route("/api/v1/chat/completions", post(chat_completions))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/**
 * \brief 启动 HTTP 服务。
 * \param addr 监听地址，如 "0.0.0.0:8080"
 */
pub async fn run(addr: &str, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on http://{}", addr);
    axum::serve(listener, router(dispatcher)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn list_models(State(dispatcher): State<AppState>) -> Result<Json<ModelList>, GatewayError> {
    Ok(Json(dispatcher.list_models()?))
}

async fn list_tags(State(dispatcher): State<AppState>) -> Result<Json<TagList>, GatewayError> {
    Ok(Json(dispatcher.list_tags()?))
}

async fn show_model(
    State(dispatcher): State<AppState>,
    request: Request,
) -> Result<Json<ModelInfo>, GatewayError> {
    let body = read_body(request.into_body()).await?;
    Ok(Json(dispatcher.show_model(&body)?))
}

async fn chat_completions(State(dispatcher): State<AppState>, request: Request) -> Response {
    handle(dispatcher, Endpoint::ChatCompletions, request).await
}

async fn native_chat(State(dispatcher): State<AppState>, request: Request) -> Response {
    handle(dispatcher, Endpoint::NativeChat, request).await
}

async fn generate(State(dispatcher): State<AppState>, request: Request) -> Response {
    handle(dispatcher, Endpoint::Generate, request).await
}

async fn handle(dispatcher: AppState, endpoint: Endpoint, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match read_body(body).await {
        Ok(body) => body,
        Err(err) => return err.into_response(),
    };
    match dispatcher.dispatch(endpoint, &parts.headers, body).await {
        Ok(reply) => reply.into_response(),
        Err(err) => err.into_response(),
    }
}

/**
 * \brief 一次性把请求体读入自有缓冲区；读失败属于服务端错误。
 */
async fn read_body(body: Body) -> Result<Bytes, GatewayError> {
    axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| GatewayError::Internal(format!("Failed to read request body: {}", e)))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": format!("Internal server error: {}", detail)})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::{header, Request as HttpRequest};
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::tests::{dispatcher, FakeAdapter, FakeAdapters, FakeRegistry};
    use crate::llm::RawResponse;
    use crate::models::ProviderKind;

    fn app(registry: FakeRegistry, adapters: FakeAdapters) -> Router {
        router(Arc::new(dispatcher(registry, adapters)))
    }

    fn post_json(uri: &str, body: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_translate_path_hello() {
        let adapter = FakeAdapter::replying(ProviderKind::OpenAI, Ok("Hello"));
        let app = app(
            FakeRegistry::default().with(1, ProviderKind::OpenAI, &["demo-1"]),
            FakeAdapters(HashMap::from([(1, adapter)])),
        );

        let resp = app
            .oneshot(post_json(
                "/api/v1/chat/completions",
                r#"{"model":"demo-1","messages":[{"role":"user","content":"hi"}],"stream":true}"#,
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let v = read_json(resp).await;
        assert_eq!(v["model"], "demo-1");
        assert_eq!(v["object"], "chat.completion");
        assert_eq!(v["choices"][0]["message"]["content"], "Hello");
        assert_eq!(v["choices"][0]["finish_reason"], "stop");
        assert_eq!(v["usage"]["total_tokens"], 0);
    }

    #[tokio::test]
    async fn test_unsupported_model_is_400() {
        let app = app(
            FakeRegistry::default().with(1, ProviderKind::OpenAI, &["a-1"]),
            FakeAdapters::default(),
        );
        let resp = app
            .oneshot(post_json(
                "/api/v1/chat/completions",
                r#"{"model":"unknown-xyz","messages":[]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(resp).await,
            serde_json::json!({"error": "Unsupported model: unknown-xyz"})
        );
    }

    #[tokio::test]
    async fn test_missing_model_is_400() {
        let app = app(FakeRegistry::default(), FakeAdapters::default());
        let resp = app
            .oneshot(post_json("/api/chat", r#"{"messages":[]}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let v = read_json(resp).await;
        assert!(v["error"].as_str().unwrap().contains("model"));
    }

    #[tokio::test]
    async fn test_adapter_error_is_500_with_detail() {
        let adapter = FakeAdapter::replying(ProviderKind::Anthropic, Err("quota exceeded"));
        let app = app(
            FakeRegistry::default().with(1, ProviderKind::Anthropic, &["b-1"]),
            FakeAdapters(HashMap::from([(1, adapter)])),
        );
        let resp = app
            .oneshot(post_json(
                "/api/v1/chat/completions",
                r#"{"model":"b-1","messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let v = read_json(resp).await;
        assert!(v["error"].as_str().unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_passthrough_relays_status_and_bytes() {
        let upstream = "{\"error\":  \"model 'llama3' not found\"}";
        let adapter = FakeAdapter::relaying(RawResponse {
            status: 404,
            content_type: Some("application/json; charset=utf-8".into()),
            body: Bytes::from_static(upstream.as_bytes()),
        });
        let app = app(
            FakeRegistry::default().with(7, ProviderKind::Ollama, &["llama3"]),
            FakeAdapters(HashMap::from([(7, adapter.clone())])),
        );
        let request = r#"{"model":"llama3","messages":[],"stream":false,"options":{"seed":1}}"#;
        let resp = app.oneshot(post_json("/api/chat", request)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), upstream.as_bytes());

        let forwarded = adapter.forwarded.lock().unwrap();
        assert_eq!(forwarded[0].body.as_ref(), request.as_bytes());
        assert!(!forwarded[0].headers.contains_key(header::CONTENT_LENGTH));
    }

    #[tokio::test]
    async fn test_native_chat_translated_for_other_kinds() {
        let adapter = FakeAdapter::replying(ProviderKind::OpenAI, Ok("pong"));
        let app = app(
            FakeRegistry::default().with(1, ProviderKind::OpenAI, &["gpt-4o"]),
            FakeAdapters(HashMap::from([(1, adapter)])),
        );
        let resp = app
            .oneshot(post_json(
                "/api/chat",
                r#"{"model":"gpt-4o","messages":[{"role":"user","content":"ping"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = read_json(resp).await;
        assert_eq!(v["message"]["content"], "pong");
        assert_eq!(v["done"], true);
    }

    #[tokio::test]
    async fn test_listing_endpoints() {
        let registry = FakeRegistry::default()
            .with(1, ProviderKind::OpenAI, &["gpt-4o"])
            .with(2, ProviderKind::Ollama, &["llama3"]);
        let app = app(registry, FakeAdapters::default());

        let get = |uri: &str| {
            HttpRequest::builder()
                .uri(uri)
                .body(Body::empty())
                .unwrap()
        };
        let models = read_json(app.clone().oneshot(get("/api/v1/models")).await.unwrap()).await;
        assert_eq!(models["object"], "list");
        assert_eq!(models["data"][1]["id"], "llama3");
        assert_eq!(models["data"][1]["owned_by"], "ollama");

        let tags = read_json(app.clone().oneshot(get("/api/tags")).await.unwrap()).await;
        assert_eq!(tags["models"][0]["name"], "gpt-4o");
        assert_eq!(tags["models"][0]["modified_at"], "1970-01-01T00:00:00.000Z");

        let again = read_json(app.clone().oneshot(get("/api/tags")).await.unwrap()).await;
        assert_eq!(tags, again);

        let health = read_json(app.oneshot(get("/health")).await.unwrap()).await;
        assert_eq!(health["status"], "ok");
    }

    #[tokio::test]
    async fn test_show_model_statuses() {
        let app = app(
            FakeRegistry::default().with(1, ProviderKind::Ollama, &["llama3"]),
            FakeAdapters::default(),
        );
        let ok = app
            .clone()
            .oneshot(post_json("/api/show", r#"{"model":"llama3"}"#))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(read_json(ok).await["details"]["family"], "ollama");

        let missing = app
            .clone()
            .oneshot(post_json("/api/show", r#"{"model":""}"#))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let unknown = app
            .oneshot(post_json("/api/show", r#"{"model":"ghost"}"#))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(unknown).await["error"], "Model not found");
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_500_and_router_keeps_serving() {
        let app = app(
            FakeRegistry::default().with(1, ProviderKind::OpenAI, &["gpt-4o"]),
            FakeAdapters(HashMap::from([(1, FakeAdapter::panicking(ProviderKind::OpenAI))])),
        );

        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/chat/completions",
                r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let v = read_json(resp).await;
        assert!(v["error"].as_str().unwrap().contains("adapter exploded"));

        let health = app
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let resp = panic_response(Box::new("boom"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let v = read_json(resp).await;
        assert!(v["error"].as_str().unwrap().contains("boom"));
    }
}
