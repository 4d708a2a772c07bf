use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/**
 * \brief 注册表存储层错误；与“未找到”严格区分。
 */
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry lookup failed: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for RegistryError {
    fn from(err: anyhow::Error) -> Self {
        RegistryError::Storage(err.to_string())
    }
}

/**
 * \brief 上游 Adapter 调用错误。
 */
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected status code: {status} -> {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("no response content found")]
    EmptyReply,

    #[error("{0} does not support raw forwarding")]
    Unsupported(String),

    #[error("invalid adapter configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AdapterError::Parse(err.to_string())
        } else {
            AdapterError::Network(err.to_string())
        }
    }
}

/**
 * \brief 网关对外错误分类，直接映射为 HTTP 状态码与 `{"error": ...}` 响应体。
 */
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("Model name is required")]
    MissingModelName,

    #[error("Model not found")]
    ModelNotFound,

    #[error("Chat completion error: {0}")]
    Upstream(AdapterError),

    #[error("Failed to proxy request to {provider}: {source}")]
    Proxy {
        provider: String,
        source: AdapterError,
    },

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_)
            | GatewayError::UnsupportedModel(_)
            | GatewayError::MissingModelName => StatusCode::BAD_REQUEST,
            GatewayError::ModelNotFound => StatusCode::NOT_FOUND,
            GatewayError::Proxy { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Upstream(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %message, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
