use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use courier_infrastructure::InterceptionSink;

use crate::handlers::{
    health::health_check,
    interception::{
        clear_all, clear_operation, disable_interception, enable_interception, get_operation,
        get_operation_by_type,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<InterceptionSink>,
    pub microservice: String,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 拦截管理API
        .route("/api/interception/enable", post(enable_interception))
        .route("/api/interception/disable", post(disable_interception))
        .route("/api/interception/clear", post(clear_all))
        .route("/api/interception/{operation_id}", get(get_operation))
        .route(
            "/api/interception/{operation_id}/clear",
            post(clear_operation),
        )
        .route(
            "/api/interception/{operation_id}/{message_type}",
            get(get_operation_by_type),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
