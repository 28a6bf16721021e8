use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use courier_config::DispatcherConfig;
use courier_domain::{
    CriticHandler, Delivery, DomainResponse, Localizer, MessageBroker, MessageEnvelope,
};
use courier_errors::FrameworkResult;

use crate::registry::{BindingRegistry, EndpointBinding};

/// 一次投递处理的终态
#[derive(Debug)]
pub enum DispatchOutcome {
    /// 处理完成且无业务错误；消息已确认
    Completed,
    /// 处理完成但有业务错误或非OK状态；消息已确认，结果上浮
    BusinessFailed(DomainResponse),
    /// 意外失败且未到投递上限；消息交还代理重投递
    Retryable,
    /// 终态失败；消息带原因进入死信通道
    FatalDeadLetter(String),
}

/// 并发门控分发器
///
/// 每个绑定独立运转：接收前先取并发名额，名额随处理任务走，
/// 任意终态都恰好释放一次。带会话标识的投递在会话内串行。
pub struct DispatcherEngine {
    broker: Arc<dyn MessageBroker>,
    localizer: Option<Arc<dyn Localizer>>,
    config: DispatcherConfig,
    /// 会话标识 -> 串行锁
    sessions: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DispatcherEngine {
    pub fn new(broker: Arc<dyn MessageBroker>, config: DispatcherConfig) -> Self {
        Self {
            broker,
            localizer: None,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    /// 为注册表的每个绑定启动一个工作者
    pub fn spawn_workers(
        self: &Arc<Self>,
        registry: &BindingRegistry,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        registry
            .bindings()
            .iter()
            .map(|binding| {
                let engine = Arc::clone(self);
                let binding = Arc::clone(binding);
                let rx = shutdown.subscribe();
                tokio::spawn(async move {
                    engine.run_binding(binding, rx).await;
                })
            })
            .collect()
    }

    async fn run_binding(
        self: Arc<Self>,
        binding: Arc<EndpointBinding>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let channel = binding.receive_channel();
        let semaphore = Arc::new(Semaphore::new(binding.max_concurrent_calls));
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        info!(
            "分发工作者启动: channel={}, 并发上限={}",
            channel, binding.max_concurrent_calls
        );

        loop {
            // 收到停机信号立即停止接收新消息
            let permit = tokio::select! {
                _ = shutdown.recv() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.broker.receive(&channel).await {
                Ok(Some(delivery)) => {
                    let engine = Arc::clone(&self);
                    let binding = Arc::clone(&binding);
                    tokio::spawn(async move {
                        // 名额随任务存活，任意路径结束都恰好释放一次
                        let _permit = permit;
                        match engine.process_delivery(&binding, delivery).await {
                            Ok(outcome) => {
                                debug!(
                                    "投递处理完成: channel={}, outcome={:?}",
                                    binding.receive_channel(),
                                    outcome
                                );
                            }
                            Err(e) => {
                                error!(
                                    "投递处理异常: channel={}, error={}",
                                    binding.receive_channel(),
                                    e
                                );
                            }
                        }
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::time::sleep(poll).await;
                }
                Err(e) => {
                    drop(permit);
                    warn!("接收消息失败: channel={}, error={}", channel, e);
                    tokio::time::sleep(poll).await;
                }
            }
        }

        // 优雅排空：等在途处理归还全部名额，超过宽限期则放弃（消息会被重投递）
        let grace = Duration::from_secs(self.config.shutdown_grace_seconds);
        let drain = semaphore.acquire_many(binding.max_concurrent_calls as u32);
        match tokio::time::timeout(grace, drain).await {
            Ok(_) => info!("分发工作者已排空: channel={}", channel),
            Err(_) => warn!("排空超时，放弃在途消息: channel={}", channel),
        };
    }

    /// 处理单条投递；供测试驱动确定性的结果序列
    pub async fn dispatch_once(
        &self,
        binding: &EndpointBinding,
    ) -> FrameworkResult<Option<DispatchOutcome>> {
        let channel = binding.receive_channel();
        match self.broker.receive(&channel).await? {
            Some(delivery) => Ok(Some(self.process_delivery(binding, delivery).await?)),
            None => Ok(None),
        }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// 仅剩映射自身持有某个会话锁时将其回收，避免映射随会话数无界增长
    async fn evict_idle_session(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(lock) = sessions.get(session_id) {
            if Arc::strong_count(lock) == 1 {
                sessions.remove(session_id);
            }
        }
    }

    /// 当前在映射中的会话锁条目数
    pub async fn session_lock_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn process_delivery(
        &self,
        binding: &EndpointBinding,
        delivery: Delivery,
    ) -> FrameworkResult<DispatchOutcome> {
        // 同一会话内串行；不同会话互不影响
        let session_id = delivery.session_id.clone();
        let session_guard = match &session_id {
            Some(session) => Some(self.session_lock(session).await.lock_owned().await),
            None => None,
        };

        let outcome = self.execute_delivery(binding, delivery).await;

        // 先放锁，再尝试回收条目；等待中的任务持有自己的克隆，不会被误删
        drop(session_guard);
        if let Some(session) = &session_id {
            self.evict_idle_session(session).await;
        }
        outcome
    }

    async fn execute_delivery(
        &self,
        binding: &EndpointBinding,
        delivery: Delivery,
    ) -> FrameworkResult<DispatchOutcome> {
        // 解码失败是终态：重投递不可能修复载荷
        let mut envelope = match MessageEnvelope::deserialize_bytes(&delivery.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                let reason = format!("反序列化信封失败: {e}");
                self.broker.dead_letter(&delivery, &reason).await?;
                return Ok(DispatchOutcome::FatalDeadLetter(reason));
            }
        };

        // 未知命令代码同样是终态校验失败
        if let Err(e) = envelope.validate_command() {
            let reason = format!("命令校验失败: {e}");
            self.broker.dead_letter(&delivery, &reason).await?;
            return Ok(DispatchOutcome::FatalDeadLetter(reason));
        }

        let context = envelope.materialize_context().clone();
        let mut critics = match &self.localizer {
            Some(localizer) => CriticHandler::new(Arc::clone(localizer)),
            None => CriticHandler::detached(),
        };

        match binding.handler.handle(&envelope, &context, &mut critics).await {
            Ok(()) => {
                self.broker
                    .ack(&delivery, binding.delete_after_read)
                    .await?;
                if critics.has_critical_errors() {
                    let response = critics.into_response();
                    warn!(
                        "业务处理失败: operation_id={}, critics={}, status={:?}",
                        envelope.operation_id,
                        response.critics.len(),
                        response.status_code
                    );
                    Ok(DispatchOutcome::BusinessFailed(response))
                } else {
                    Ok(DispatchOutcome::Completed)
                }
            }
            Err(e) if delivery.delivery_count >= binding.max_delivery_count => {
                let reason = format!(
                    "投递 {} 次后仍然失败: {e}",
                    delivery.delivery_count
                );
                self.broker.dead_letter(&delivery, &reason).await?;
                Ok(DispatchOutcome::FatalDeadLetter(reason))
            }
            Err(e) => {
                warn!(
                    "处理失败，交还重投递: operation_id={}, 第{}次, error={}",
                    envelope.operation_id, delivery.delivery_count, e
                );
                self.broker.nack(&delivery).await?;
                Ok(DispatchOutcome::Retryable)
            }
        }
    }
}
