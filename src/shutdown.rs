use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 持有一个广播通道；所有长生命周期组件订阅同一信号，
/// 收到信号后各自停止接收新工作并排空在途工作。
pub struct ShutdownManager {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> &broadcast::Sender<()> {
        &self.tx
    }

    /// 触发关闭；重复触发是无操作
    pub fn shutdown(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            debug!("关闭信号已经触发过");
            return;
        }

        let subscribers = self.tx.receiver_count();
        info!("发送关闭信号给 {} 个订阅者", subscribers);
        // 可能没有接收者，忽略错误
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
