use axum::extract::{Path, State};
use tracing::info;

use courier_infrastructure::InterceptedMessage;

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::routes::AppState;

/// 开启拦截；非测试环境返回请求错误
pub async fn enable_interception(
    State(state): State<AppState>,
) -> Result<ApiResponse<()>, ApiError> {
    state.sink.set_enabled(true)?;
    info!("拦截已开启");
    Ok(ApiResponse::success_empty_with_message(
        "拦截已开启".to_string(),
    ))
}

pub async fn disable_interception(
    State(state): State<AppState>,
) -> Result<ApiResponse<()>, ApiError> {
    state.sink.set_enabled(false)?;
    info!("拦截已关闭");
    Ok(ApiResponse::success_empty_with_message(
        "拦截已关闭".to_string(),
    ))
}

/// 取指定操作的全部拦截记录；不存在的操作返回空列表
pub async fn get_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<ApiResponse<Vec<InterceptedMessage>>, ApiError> {
    let messages = state.sink.messages_for(&operation_id).await;
    Ok(ApiResponse::success(messages))
}

/// 按操作号和消息类型名过滤拦截记录
pub async fn get_operation_by_type(
    State(state): State<AppState>,
    Path((operation_id, message_type)): Path<(String, String)>,
) -> Result<ApiResponse<Vec<InterceptedMessage>>, ApiError> {
    let messages = state
        .sink
        .messages_for_type(&operation_id, &message_type)
        .await;
    Ok(ApiResponse::success(messages))
}

/// 清除单个操作的记录；操作不存在返回404
pub async fn clear_operation(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    if state.sink.clear_operation(&operation_id).await {
        Ok(ApiResponse::success_empty_with_message(format!(
            "操作 {operation_id} 的拦截记录已清除"
        )))
    } else {
        Err(ApiError::NotFound)
    }
}

pub async fn clear_all(State(state): State<AppState>) -> Result<ApiResponse<()>, ApiError> {
    state.sink.clear_all().await;
    Ok(ApiResponse::success_empty_with_message(
        "全部拦截记录已清除".to_string(),
    ))
}
