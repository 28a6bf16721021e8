use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use courier_config::Environment;
use courier_domain::{EndpointKind, MessageEnvelope};
use courier_errors::{FrameworkError, FrameworkResult};

/// 被拦截的出站消息记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptedMessage {
    /// 序列化后的信封，原样保存
    pub payload: String,
    pub message_type_name: String,
    pub endpoint_kind: EndpointKind,
    pub channel_name: String,
    pub tag_config_name: String,
}

/// 测试拦截槽
///
/// 仅在 development/integration 环境且显式开启时生效。生效期间发送路径
/// 在触碰代理客户端之前改为写入此处的按操作号分桶的记录。
/// 进程内唯一实例，启动时创建、测试边界清理，绝不使用环境全局状态。
pub struct InterceptionSink {
    environment: Environment,
    enabled: AtomicBool,
    /// 操作号 -> 追加式记录桶；多个分发器工作者可并发写入
    records: RwLock<HashMap<String, Vec<InterceptedMessage>>>,
}

impl InterceptionSink {
    pub fn new(environment: Environment, enabled: bool) -> Self {
        Self {
            environment,
            enabled: AtomicBool::new(enabled && environment.allows_interception()),
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.environment.allows_interception() && self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) -> FrameworkResult<()> {
        if enabled && !self.environment.allows_interception() {
            return Err(FrameworkError::config_error(format!(
                "环境 {} 不允许开启拦截",
                self.environment.name()
            )));
        }
        self.enabled.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    /// 捕获一条出站信封，按操作号追加
    pub async fn intercept(
        &self,
        envelope: &MessageEnvelope,
        endpoint_kind: EndpointKind,
        tag_config_name: &str,
        channel_name: &str,
    ) -> FrameworkResult<()> {
        let payload = serde_json::to_string(envelope)
            .map_err(|e| FrameworkError::Serialization(format!("序列化被拦截信封失败: {e}")))?;

        let record = InterceptedMessage {
            payload,
            message_type_name: envelope.message_type_name().to_string(),
            endpoint_kind,
            channel_name: channel_name.to_string(),
            tag_config_name: tag_config_name.to_string(),
        };

        let mut records = self.records.write().await;
        records
            .entry(envelope.operation_id.clone())
            .or_default()
            .push(record);

        debug!(
            "拦截消息: operation_id={}, type={}, channel={}",
            envelope.operation_id,
            envelope.message_type_name(),
            channel_name
        );
        Ok(())
    }

    /// 取指定操作的全部记录，保持捕获顺序
    pub async fn messages_for(&self, operation_id: &str) -> Vec<InterceptedMessage> {
        let records = self.records.read().await;
        records.get(operation_id).cloned().unwrap_or_default()
    }

    /// 按操作号与消息类型名过滤
    pub async fn messages_for_type(
        &self,
        operation_id: &str,
        message_type_name: &str,
    ) -> Vec<InterceptedMessage> {
        self.messages_for(operation_id)
            .await
            .into_iter()
            .filter(|m| m.message_type_name == message_type_name)
            .collect()
    }

    /// 清除单个操作的记录；返回是否存在过
    pub async fn clear_operation(&self, operation_id: &str) -> bool {
        self.records.write().await.remove(operation_id).is_some()
    }

    pub async fn clear_all(&self) {
        self.records.write().await.clear();
    }

    pub async fn operation_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(operation_id: &str, message_type: &str) -> MessageEnvelope {
        MessageEnvelope::business("orders", message_type, json!({"n": 1}))
            .with_operation_id(operation_id)
    }

    #[tokio::test]
    async fn test_capture_order_and_type_filter() {
        let sink = InterceptionSink::new(Environment::Development, true);
        assert!(sink.is_active());

        sink.intercept(
            &envelope("op-1", "NotificationMSG"),
            EndpointKind::Queue,
            "notifications",
            "notify-queue",
        )
        .await
        .unwrap();
        sink.intercept(
            &envelope("op-1", "NotificationMSG"),
            EndpointKind::Queue,
            "notifications",
            "notify-queue",
        )
        .await
        .unwrap();
        sink.intercept(
            &envelope("op-1", "OrderPlacedMSG"),
            EndpointKind::Topic,
            "orders",
            "order-topic",
        )
        .await
        .unwrap();

        let all = sink.messages_for("op-1").await;
        assert_eq!(all.len(), 3);
        // 捕获顺序保持发送顺序
        assert_eq!(all[0].message_type_name, "NotificationMSG");
        assert_eq!(all[2].message_type_name, "OrderPlacedMSG");

        let notifications = sink.messages_for_type("op-1", "NotificationMSG").await;
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].channel_name, "notify-queue");
    }

    #[tokio::test]
    async fn test_clear_one_operation_leaves_others() {
        let sink = InterceptionSink::new(Environment::Integration, true);

        sink.intercept(
            &envelope("op-1", "NotificationMSG"),
            EndpointKind::Queue,
            "tag",
            "chan",
        )
        .await
        .unwrap();
        sink.intercept(
            &envelope("op-2", "NotificationMSG"),
            EndpointKind::Queue,
            "tag",
            "chan",
        )
        .await
        .unwrap();

        assert!(sink.clear_operation("op-1").await);
        assert!(!sink.clear_operation("op-1").await);
        assert!(sink.messages_for("op-1").await.is_empty());
        assert_eq!(sink.messages_for("op-2").await.len(), 1);

        sink.clear_all().await;
        assert_eq!(sink.operation_count().await, 0);
    }

    #[tokio::test]
    async fn test_inactive_outside_test_environments() {
        let sink = InterceptionSink::new(Environment::Production, true);
        assert!(!sink.is_active());
        assert!(sink.set_enabled(true).is_err());

        let qa_sink = InterceptionSink::new(Environment::Qa, true);
        assert!(!qa_sink.is_active());

        let dev_sink = InterceptionSink::new(Environment::Development, false);
        assert!(!dev_sink.is_active());
        dev_sink.set_enabled(true).unwrap();
        assert!(dev_sink.is_active());
        dev_sink.set_enabled(false).unwrap();
        assert!(!dev_sink.is_active());
    }

    #[tokio::test]
    async fn test_concurrent_interception_is_lossless() {
        use std::sync::Arc;
        let sink = Arc::new(InterceptionSink::new(Environment::Development, true));

        let mut handles = Vec::new();
        for worker in 0..8 {
            let sink = Arc::clone(&sink);
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let op = format!("op-{}", i % 5);
                    sink.intercept(
                        &envelope(&op, "NotificationMSG"),
                        EndpointKind::Queue,
                        "tag",
                        &format!("chan-{worker}"),
                    )
                    .await
                    .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut total = 0;
        for i in 0..5 {
            total += sink.messages_for(&format!("op-{i}")).await.len();
        }
        assert_eq!(total, 8 * 25);
    }
}
