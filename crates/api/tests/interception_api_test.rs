//! 拦截管理面集成测试：路由直连，不经过网络。

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use courier_api::{create_routes, AppState};
use courier_config::Environment;
use courier_domain::EndpointKind;
use courier_infrastructure::InterceptionSink;
use courier_testing_utils::business_envelope;

fn app(sink: Arc<InterceptionSink>) -> Router {
    create_routes(AppState {
        sink,
        microservice: "orders".to_string(),
    })
}

async fn call(app: &Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

async fn seed(sink: &InterceptionSink) {
    sink.intercept(
        &business_envelope("op-1", "NotificationMSG"),
        EndpointKind::Queue,
        "notifications",
        "development-notifications",
    )
    .await
    .unwrap();
    sink.intercept(
        &business_envelope("op-1", "OrderPlacedMSG"),
        EndpointKind::Topic,
        "orders",
        "development-orders",
    )
    .await
    .unwrap();
    sink.intercept(
        &business_envelope("op-2", "NotificationMSG"),
        EndpointKind::Queue,
        "notifications",
        "development-notifications",
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_health_reports_service_and_interception_state() {
    let sink = Arc::new(InterceptionSink::new(Environment::Development, true));
    let app = app(sink);

    let (status, body) = call(&app, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "orders");
    assert_eq!(body["interception_active"], true);
}

#[tokio::test]
async fn test_enable_disable_toggles_sink() {
    let sink = Arc::new(InterceptionSink::new(Environment::Development, false));
    let app = app(sink.clone());

    assert!(!sink.is_active());
    let (status, body) = call(&app, Method::POST, "/api/interception/enable").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(sink.is_active());

    let (status, _) = call(&app, Method::POST, "/api/interception/disable").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!sink.is_active());
}

#[tokio::test]
async fn test_enable_rejected_outside_test_environments() {
    let sink = Arc::new(InterceptionSink::new(Environment::Production, false));
    let app = app(sink.clone());

    let (status, body) = call(&app, Method::POST, "/api/interception/enable").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(!sink.is_active());
}

#[tokio::test]
async fn test_fetch_by_operation_and_type() {
    let sink = Arc::new(InterceptionSink::new(Environment::Development, true));
    seed(&sink).await;
    let app = app(sink);

    let (status, body) = call(&app, Method::GET, "/api/interception/op-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) =
        call(&app, Method::GET, "/api/interception/op-1/NotificationMSG").await;
    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["message_type_name"], "NotificationMSG");
    assert_eq!(data[0]["channel_name"], "development-notifications");

    // 未知操作号返回空列表而不是404
    let (status, body) = call(&app, Method::GET, "/api/interception/op-none").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_is_scoped_per_operation() {
    let sink = Arc::new(InterceptionSink::new(Environment::Development, true));
    seed(&sink).await;
    let app = app(sink.clone());

    let (status, _) = call(&app, Method::POST, "/api/interception/op-1/clear").await;
    assert_eq!(status, StatusCode::OK);
    // 其他操作的记录不受影响
    assert_eq!(sink.messages_for("op-2").await.len(), 1);

    // 再次清除同一操作返回404
    let (status, _) = call(&app, Method::POST, "/api/interception/op-1/clear").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::POST, "/api/interception/clear").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sink.operation_count().await, 0);
}
