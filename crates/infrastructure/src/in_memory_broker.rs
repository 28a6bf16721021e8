use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use courier_domain::{Delivery, EndpointKind, MessageBroker, ProvisionRequest};
use courier_errors::{FrameworkError, FrameworkResult};

/// 内存消息代理实现
///
/// 适用于嵌入式部署和测试。支持多通道、主题扇出到订阅、
/// 投递计数、未确认消息跟踪和死信存放。
pub struct InMemoryBroker {
    /// 通道存储：物理通道名 -> 通道状态
    channels: Arc<RwLock<HashMap<String, Arc<ChannelState>>>>,
    /// 主题 -> 订阅列表
    topics: Arc<RwLock<HashMap<String, Vec<TopicSubscription>>>>,
    next_tag: AtomicU64,
}

struct ChannelState {
    queue: Mutex<VecDeque<StoredMessage>>,
    /// 已投递未确认的消息，按投递标签索引
    unacked: Mutex<HashMap<u64, StoredMessage>>,
    /// delete_after_read=false 的消息确认后保留在此，可读不可再消费
    archive: Mutex<Vec<Vec<u8>>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    depth: AtomicU32,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            unacked: Mutex::new(HashMap::new()),
            archive: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
            depth: AtomicU32::new(0),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    payload: Vec<u8>,
    delivery_count: u32,
    session_id: Option<String>,
}

#[derive(Debug, Clone)]
struct TopicSubscription {
    subscription: String,
    /// SQL风格过滤表达式；内存实现只保存不求值（过滤引擎是外部协作者）
    _filter: Option<String>,
}

/// 死信记录：原始载荷加人类可读原因
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub payload: Vec<u8>,
    pub reason: String,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            topics: Arc::new(RwLock::new(HashMap::new())),
            next_tag: AtomicU64::new(1),
        }
    }

    /// 主题订阅对应的物理通道名
    pub fn subscription_channel(topic: &str, subscription: &str) -> String {
        courier_domain::subscription_channel(topic, subscription)
    }

    async fn get_or_create_channel(&self, name: &str) -> Arc<ChannelState> {
        {
            let channels = self.channels.read().await;
            if let Some(state) = channels.get(name) {
                return Arc::clone(state);
            }
        }
        let mut channels = self.channels.write().await;
        Arc::clone(
            channels
                .entry(name.to_string())
                .or_insert_with(|| {
                    debug!("创建内存通道: {}", name);
                    Arc::new(ChannelState::new())
                }),
        )
    }

    async fn channel(&self, name: &str) -> FrameworkResult<Arc<ChannelState>> {
        let channels = self.channels.read().await;
        channels
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| FrameworkError::ChannelNotFound(name.to_string()))
    }

    async fn enqueue(&self, channel: &str, message: StoredMessage) {
        let state = self.get_or_create_channel(channel).await;
        state.queue.lock().await.push_back(message);
        state.depth.fetch_add(1, Ordering::Relaxed);
    }

    /// 带会话标识发送；同一会话内的消息由分发器串行处理
    pub async fn send_with_session(
        &self,
        channel: &str,
        payload: &[u8],
        session_id: &str,
    ) -> FrameworkResult<()> {
        self.enqueue(
            channel,
            StoredMessage {
                payload: payload.to_vec(),
                delivery_count: 0,
                session_id: Some(session_id.to_string()),
            },
        )
        .await;
        Ok(())
    }

    /// 测试辅助：读取通道的死信记录
    pub async fn dead_letters(&self, channel: &str) -> Vec<DeadLetter> {
        match self.channel(channel).await {
            Ok(state) => state.dead_letters.lock().await.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// 测试辅助：读取确认后保留的消息（delete_after_read=false）
    pub async fn archived(&self, channel: &str) -> Vec<Vec<u8>> {
        match self.channel(channel).await {
            Ok(state) => state.archive.lock().await.clone(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn send(
        &self,
        channel: &str,
        payload: &[u8],
        _ttl: Option<Duration>,
    ) -> FrameworkResult<()> {
        // 主题通道扇出到每个订阅
        let subscriptions = {
            let topics = self.topics.read().await;
            topics.get(channel).cloned()
        };

        match subscriptions {
            Some(subs) => {
                for sub in &subs {
                    let physical = Self::subscription_channel(channel, &sub.subscription);
                    self.enqueue(
                        &physical,
                        StoredMessage {
                            payload: payload.to_vec(),
                            delivery_count: 0,
                            session_id: None,
                        },
                    )
                    .await;
                }
                debug!("主题 {} 扇出到 {} 个订阅", channel, subs.len());
            }
            None => {
                self.enqueue(
                    channel,
                    StoredMessage {
                        payload: payload.to_vec(),
                        delivery_count: 0,
                        session_id: None,
                    },
                )
                .await;
            }
        }
        Ok(())
    }

    async fn receive(&self, channel: &str) -> FrameworkResult<Option<Delivery>> {
        let state = self.get_or_create_channel(channel).await;
        let mut queue = state.queue.lock().await;

        let Some(mut message) = queue.pop_front() else {
            return Ok(None);
        };
        drop(queue);

        state.depth.fetch_sub(1, Ordering::Relaxed);
        message.delivery_count += 1;

        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        let delivery = Delivery {
            channel: channel.to_string(),
            payload: message.payload.clone(),
            delivery_count: message.delivery_count,
            session_id: message.session_id.clone(),
            delivery_tag: tag,
        };
        state.unacked.lock().await.insert(tag, message);

        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery, delete_after_read: bool) -> FrameworkResult<()> {
        let state = self.channel(&delivery.channel).await?;
        let removed = state.unacked.lock().await.remove(&delivery.delivery_tag);

        match removed {
            Some(message) => {
                if !delete_after_read {
                    state.archive.lock().await.push(message.payload);
                }
                Ok(())
            }
            None => {
                warn!(
                    "确认了未知投递标签 {} (通道 {})",
                    delivery.delivery_tag, delivery.channel
                );
                Ok(())
            }
        }
    }

    async fn nack(&self, delivery: &Delivery) -> FrameworkResult<()> {
        let state = self.channel(&delivery.channel).await?;
        let removed = state.unacked.lock().await.remove(&delivery.delivery_tag);

        if let Some(message) = removed {
            // 重投递：回到队首，保留投递计数
            state.queue.lock().await.push_front(message);
            state.depth.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> FrameworkResult<()> {
        let state = self.channel(&delivery.channel).await?;
        let removed = state.unacked.lock().await.remove(&delivery.delivery_tag);

        if let Some(message) = removed {
            info!(
                "消息进入死信通道: channel={}, reason={}",
                delivery.channel, reason
            );
            state.dead_letters.lock().await.push(DeadLetter {
                payload: message.payload,
                reason: reason.to_string(),
            });
        }
        Ok(())
    }

    async fn provision(&self, request: &ProvisionRequest) -> FrameworkResult<()> {
        match request.kind {
            EndpointKind::Queue => {
                self.get_or_create_channel(&request.channel).await;
            }
            EndpointKind::Topic => {
                let subscription = request.subscription.clone().ok_or_else(|| {
                    FrameworkError::config_error(format!(
                        "主题 {} 置备缺少订阅名",
                        request.channel
                    ))
                })?;
                let physical = Self::subscription_channel(&request.channel, &subscription);
                self.get_or_create_channel(&physical).await;

                let mut topics = self.topics.write().await;
                let subs = topics.entry(request.channel.clone()).or_default();
                if !subs.iter().any(|s| s.subscription == subscription) {
                    subs.push(TopicSubscription {
                        subscription,
                        _filter: request.filter.clone(),
                    });
                }
            }
        }
        debug!("置备完成: {:?} {}", request.kind, request.channel);
        Ok(())
    }

    async fn channel_depth(&self, channel: &str) -> FrameworkResult<u32> {
        let state = self.channel(channel).await?;
        Ok(state.depth.load(Ordering::Relaxed))
    }

    async fn purge_channel(&self, channel: &str) -> FrameworkResult<()> {
        let state = self.channel(channel).await?;
        let mut queue = state.queue.lock().await;
        let purged = queue.len();
        queue.clear();
        state.depth.store(0, Ordering::Relaxed);
        info!("清空通道 {} 的 {} 条消息", channel, purged);
        Ok(())
    }
}
