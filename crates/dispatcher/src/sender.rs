use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use courier_config::Environment;
use courier_domain::{EndpointKind, MessageBroker, MessageEnvelope};
use courier_errors::{FrameworkError, FrameworkResult};
use courier_infrastructure::InterceptionSink;

use crate::registry::rewrite_channel_name;

/// 出站发送路径
///
/// 生产者、API和作业调度器共用的唯一出口：先做环境通道名改写，
/// 拦截槽生效时在触碰代理之前改写为拦截记录，否则交给代理发送。
pub struct MessageSender {
    broker: Arc<dyn MessageBroker>,
    environment: Environment,
    sink: Option<Arc<InterceptionSink>>,
}

impl MessageSender {
    pub fn new(broker: Arc<dyn MessageBroker>, environment: Environment) -> Self {
        Self {
            broker,
            environment,
            sink: None,
        }
    }

    pub fn with_interception(mut self, sink: Arc<InterceptionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// 发送信封到逻辑通道；通道名按当前环境改写
    pub async fn send(
        &self,
        envelope: &MessageEnvelope,
        kind: EndpointKind,
        channel: &str,
        ttl: Option<Duration>,
    ) -> FrameworkResult<()> {
        let physical = rewrite_channel_name(channel, self.environment);

        if let Some(sink) = &self.sink {
            if sink.is_active() {
                sink.intercept(envelope, kind, channel, &physical).await?;
                debug!(
                    "消息被拦截: operation_id={}, channel={}",
                    envelope.operation_id, physical
                );
                return Ok(());
            }
        }

        let payload = envelope
            .serialize_bytes()
            .map_err(|e| FrameworkError::Serialization(format!("序列化出站信封失败: {e}")))?;
        self.broker.send(&physical, &payload, ttl).await?;

        debug!(
            "消息已发送: operation_id={}, type={}, channel={}",
            envelope.operation_id,
            envelope.message_type_name(),
            physical
        );
        Ok(())
    }
}
