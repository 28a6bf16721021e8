use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_domain::{
    CriticHandler, MessageEnvelope, MessageHandler, StatusCode, TransactionContext,
};
use courier_errors::{FrameworkError, FrameworkResult};

/// 记录收到的信封与上下文；可选地产生业务错误
pub struct RecordingHandler {
    envelopes: Mutex<Vec<MessageEnvelope>>,
    contexts: Mutex<Vec<TransactionContext>>,
    business_error: Option<(String, String)>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            envelopes: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            business_error: None,
        }
    }

    /// 每次处理都追加一条业务错误批注并置 BadRequest 状态
    pub fn with_business_error(code: &str, message: &str) -> Self {
        Self {
            envelopes: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            business_error: Some((code.to_string(), message.to_string())),
        }
    }

    pub async fn envelopes(&self) -> Vec<MessageEnvelope> {
        self.envelopes.lock().await.clone()
    }

    pub async fn contexts(&self) -> Vec<TransactionContext> {
        self.contexts.lock().await.clone()
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(
        &self,
        envelope: &MessageEnvelope,
        context: &TransactionContext,
        critics: &mut CriticHandler,
    ) -> FrameworkResult<()> {
        self.envelopes.lock().await.push(envelope.clone());
        self.contexts.lock().await.push(context.clone());
        if let Some((code, message)) = &self.business_error {
            critics.add_error(code, &[message]);
            critics.set_status(StatusCode::BadRequest);
        }
        Ok(())
    }
}

/// 前 N 次处理失败，之后成功
pub struct FlakyHandler {
    failures_remaining: AtomicUsize,
    attempts: AtomicUsize,
    error_message: String,
}

impl FlakyHandler {
    pub fn failing_times(failures: usize, error_message: &str) -> Self {
        Self {
            failures_remaining: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            error_message: error_message.to_string(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for FlakyHandler {
    async fn handle(
        &self,
        _envelope: &MessageEnvelope,
        _context: &TransactionContext,
        _critics: &mut CriticHandler,
    ) -> FrameworkResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(FrameworkError::handler_error(self.error_message.clone()));
        }
        Ok(())
    }
}

/// 永远失败的处理器
pub struct AlwaysFailHandler {
    error_message: String,
}

impl AlwaysFailHandler {
    pub fn new(error_message: &str) -> Self {
        Self {
            error_message: error_message.to_string(),
        }
    }
}

#[async_trait]
impl MessageHandler for AlwaysFailHandler {
    async fn handle(
        &self,
        _envelope: &MessageEnvelope,
        _context: &TransactionContext,
        _critics: &mut CriticHandler,
    ) -> FrameworkResult<()> {
        Err(FrameworkError::handler_error(self.error_message.clone()))
    }
}

/// 统计并发度的处理器：记录同时在处理中的最大数量
pub struct CountingHandler {
    current: AtomicUsize,
    max_observed: AtomicUsize,
    handled: AtomicUsize,
    delay: Duration,
}

impl CountingHandler {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max_observed: AtomicUsize::new(0),
            handled: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn max_observed(&self) -> usize {
        self.max_observed.load(Ordering::SeqCst)
    }

    pub fn handled(&self) -> usize {
        self.handled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for CountingHandler {
    async fn handle(
        &self,
        _envelope: &MessageEnvelope,
        _context: &TransactionContext,
        _critics: &mut CriticHandler,
    ) -> FrameworkResult<()> {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
