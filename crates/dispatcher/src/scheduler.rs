use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, info};

use courier_config::SchedulerConfig;
use courier_domain::{EndpointKind, JobScheduleStore, MessageEnvelope, ScheduledJob};
use courier_errors::FrameworkResult;

use crate::sender::MessageSender;

/// 作业调度分发器
///
/// 周期性询问计划存储，把到期的 (微服务, 作业, 分区) 元组包装成
/// Trigger 信封发布到公共作业通道。单个元组发布失败只记录日志，
/// 不影响同一轮的其余元组。
pub struct JobDispatcher {
    store: Arc<dyn JobScheduleStore>,
    sender: Arc<MessageSender>,
    jobs_channel: String,
    config: SchedulerConfig,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<dyn JobScheduleStore>,
        sender: Arc<MessageSender>,
        jobs_channel: impl Into<String>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            sender,
            jobs_channel: jobs_channel.into(),
            config,
        }
    }

    /// 执行一轮调度；返回成功发布的触发数
    pub async fn tick(&self) -> FrameworkResult<usize> {
        let due = self.store.due_jobs(Utc::now()).await?;
        let mut dispatched = 0;

        for entry in due {
            let job = ScheduledJob::trigger(
                entry.microservice.clone(),
                entry.job.clone(),
                entry.partition,
                entry.activation,
            );
            let envelope = MessageEnvelope::job(entry.microservice.clone(), job);

            match self
                .sender
                .send(&envelope, EndpointKind::Queue, &self.jobs_channel, None)
                .await
            {
                Ok(()) => {
                    dispatched += 1;
                    info!(
                        "触发作业: {}/{} 分区 {} (activation={})",
                        entry.microservice, entry.job, entry.partition, entry.activation
                    );
                }
                Err(e) => {
                    // 单个元组失败不中断本轮其余元组
                    error!(
                        "触发作业失败: {}/{} 分区 {}, error={}",
                        entry.microservice, entry.job, entry.partition, e
                    );
                }
            }
        }

        Ok(dispatched)
    }

    /// 发布 Abort 信封；消费端协作式停止，已发布的 Trigger 不会被撤回
    pub async fn abort(
        &self,
        microservice: &str,
        job: &str,
        partition: i32,
    ) -> FrameworkResult<()> {
        let abort_job = ScheduledJob::abort(microservice, job, partition);
        let envelope = MessageEnvelope::job(microservice, abort_job);
        self.sender
            .send(&envelope, EndpointKind::Queue, &self.jobs_channel, None)
            .await?;

        info!("发布作业中止: {}/{} 分区 {}", microservice, job, partition);
        Ok(())
    }

    /// 周期运行直到收到停机信号
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_seconds));
        info!(
            "作业调度器启动: 通道 {}, 周期 {}s",
            self.jobs_channel, self.config.tick_interval_seconds
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("作业调度器停止");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("调度轮次失败: {}", e);
                    }
                }
            }
        }
    }
}
