use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    options::*,
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use courier_domain::{Delivery, EndpointKind, MessageBroker, ProvisionRequest};
use courier_errors::{FrameworkError, FrameworkResult};

/// RabbitMQ消息代理实现
pub struct RabbitMqBroker {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqBroker {
    /// 创建新的RabbitMQ代理实例
    pub async fn new(url: &str) -> FrameworkResult<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| FrameworkError::MessageBroker(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| FrameworkError::MessageBroker(format!("创建通道失败: {e}")))?;

        info!("成功连接到RabbitMQ: {}", url);

        Ok(Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
        })
    }

    async fn declare_queue(&self, channel: &Channel, queue_name: &str) -> FrameworkResult<()> {
        channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                FrameworkError::MessageBroker(format!("声明队列 {queue_name} 失败: {e}"))
            })?;

        debug!("队列 {} 声明成功", queue_name);
        Ok(())
    }

    /// 主题订阅对应的物理队列名
    pub fn subscription_queue(topic: &str, subscription: &str) -> String {
        courier_domain::subscription_channel(topic, subscription)
    }

    /// 获取连接状态
    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// 关闭连接
    pub async fn close(&self) -> FrameworkResult<()> {
        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| FrameworkError::MessageBroker(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for RabbitMqBroker {
    async fn send(
        &self,
        channel: &str,
        payload: &[u8],
        ttl: Option<Duration>,
    ) -> FrameworkResult<()> {
        let ch = self.channel.lock().await;

        let mut properties = BasicProperties::default().with_delivery_mode(2); // 2 = persistent
        if let Some(ttl) = ttl {
            properties = properties.with_expiration(ttl.as_millis().to_string().into());
        }

        let confirm = ch
            .basic_publish(
                "",
                channel,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| {
                FrameworkError::MessageBroker(format!("发布消息到通道 {channel} 失败: {e}"))
            })?;

        // 等待确认
        confirm
            .await
            .map_err(|e| FrameworkError::MessageBroker(format!("消息发布确认失败: {e}")))?;

        debug!("消息已发布到通道: {}", channel);
        Ok(())
    }

    async fn receive(&self, channel: &str) -> FrameworkResult<Option<Delivery>> {
        let ch = self.channel.lock().await;

        let get_result = ch.basic_get(channel, BasicGetOptions::default()).await;

        match get_result {
            Ok(Some(message)) => {
                let inbound = message.delivery;
                // 优先读代理维护的 x-delivery-count 头；没有时用重投递标记估算
                let delivery_count = inbound
                    .properties
                    .headers()
                    .as_ref()
                    .and_then(|h| h.inner().get(&ShortString::from("x-delivery-count")))
                    .and_then(|v| match v {
                        AMQPValue::LongLongInt(n) => Some(*n as u32 + 1),
                        AMQPValue::LongInt(n) => Some(*n as u32 + 1),
                        _ => None,
                    })
                    .unwrap_or(if inbound.redelivered { 2 } else { 1 });

                Ok(Some(Delivery {
                    channel: channel.to_string(),
                    payload: inbound.data,
                    delivery_count,
                    // RabbitMQ的会话语义由独占消费者承担，basic_get路径不携带
                    session_id: None,
                    delivery_tag: inbound.delivery_tag,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("NOT_FOUND") || error_msg.contains("404") {
                    // 通道不存在，返回空结果而不是错误
                    debug!("通道 {} 不存在，返回空结果", channel);
                    Ok(None)
                } else {
                    Err(FrameworkError::MessageBroker(format!(
                        "从通道 {channel} 获取消息失败: {e}"
                    )))
                }
            }
        }
    }

    async fn ack(&self, delivery: &Delivery, _delete_after_read: bool) -> FrameworkResult<()> {
        // RabbitMQ没有读后保留语义，delete_after_read=false 也按确认处理
        let ch = self.channel.lock().await;
        ch.basic_ack(delivery.delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| FrameworkError::MessageBroker(format!("确认消息失败: {e}")))?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> FrameworkResult<()> {
        let ch = self.channel.lock().await;
        ch.basic_nack(
            delivery.delivery_tag,
            BasicNackOptions {
                requeue: true,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| FrameworkError::MessageBroker(format!("拒绝消息失败: {e}")))?;
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> FrameworkResult<()> {
        // 不重入队的拒绝会路由到队列配置的死信交换机
        info!(
            "消息进入死信通道: channel={}, reason={}",
            delivery.channel, reason
        );
        let ch = self.channel.lock().await;
        ch.basic_nack(
            delivery.delivery_tag,
            BasicNackOptions {
                requeue: false,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| FrameworkError::MessageBroker(format!("死信投递失败: {e}")))?;
        Ok(())
    }

    async fn provision(&self, request: &ProvisionRequest) -> FrameworkResult<()> {
        let ch = self.channel.lock().await;

        match request.kind {
            EndpointKind::Queue => {
                self.declare_queue(&ch, &request.channel).await?;
            }
            EndpointKind::Topic => {
                let subscription = request.subscription.as_deref().ok_or_else(|| {
                    FrameworkError::config_error(format!(
                        "主题 {} 置备缺少订阅名",
                        request.channel
                    ))
                })?;

                ch.exchange_declare(
                    &request.channel,
                    lapin::ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    FrameworkError::MessageBroker(format!(
                        "声明主题交换机 {} 失败: {e}",
                        request.channel
                    ))
                })?;

                let queue_name = Self::subscription_queue(&request.channel, subscription);
                self.declare_queue(&ch, &queue_name).await?;

                // 过滤表达式映射为路由键；未给出时接收全部
                let routing_key = request.filter.as_deref().unwrap_or("#");
                ch.queue_bind(
                    &queue_name,
                    &request.channel,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    FrameworkError::MessageBroker(format!("绑定订阅 {queue_name} 失败: {e}"))
                })?;
            }
        }

        debug!("置备完成: {:?} {}", request.kind, request.channel);
        Ok(())
    }

    async fn channel_depth(&self, channel: &str) -> FrameworkResult<u32> {
        let ch = self.channel.lock().await;
        let queue_info = ch
            .queue_declare(
                channel,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await;

        match queue_info {
            Ok(info) => Ok(info.message_count()),
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("NOT_FOUND") || error_msg.contains("404") {
                    debug!("通道 {} 不存在，返回深度0", channel);
                    Ok(0)
                } else {
                    Err(FrameworkError::MessageBroker(format!(
                        "获取通道 {channel} 信息失败: {e}"
                    )))
                }
            }
        }
    }

    async fn purge_channel(&self, channel: &str) -> FrameworkResult<()> {
        let ch = self.channel.lock().await;
        ch.queue_purge(channel, QueuePurgeOptions::default())
            .await
            .map_err(|e| FrameworkError::MessageBroker(format!("清空通道 {channel} 失败: {e}")))?;

        debug!("通道 {} 已清空", channel);
        Ok(())
    }
}
