use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use courier_errors::FrameworkError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("框架错误: {0}")]
    Framework(#[from] FrameworkError),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("未找到资源")]
    NotFound,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // 环境不允许开启拦截等配置类违规按请求错误返回
            ApiError::Framework(FrameworkError::Configuration(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::Framework(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::Serialization(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "未找到资源".to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}
