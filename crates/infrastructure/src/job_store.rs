use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::RwLock;
use tracing::debug;

use courier_domain::{DueJob, JobScheduleStore};
use courier_errors::{FrameworkError, FrameworkResult};

struct ScheduleEntry {
    microservice: String,
    job: String,
    partition: i32,
    schedule: Schedule,
    next_due: Option<DateTime<Utc>>,
}

/// 内存作业计划存储
///
/// 以CRON表达式描述作业节奏；due_jobs 返回到期元组并推进下次到期时间，
/// 同一元组在重新到期前不会再次返回。
pub struct InMemoryJobStore {
    entries: RwLock<Vec<ScheduleEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// 注册作业分区计划；无效CRON表达式是启动期错误
    pub async fn register(
        &self,
        microservice: &str,
        job: &str,
        partition: i32,
        cron_expr: &str,
    ) -> FrameworkResult<()> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| FrameworkError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        let next_due = schedule.upcoming(Utc).next();

        let mut entries = self.entries.write().await;
        // 同一 (微服务, 作业, 分区) 重复注册视为替换
        entries.retain(|e| {
            !(e.microservice == microservice && e.job == job && e.partition == partition)
        });
        entries.push(ScheduleEntry {
            microservice: microservice.to_string(),
            job: job.to_string(),
            partition,
            schedule,
            next_due,
        });

        debug!(
            "注册作业计划: {}/{} 分区 {} ({})",
            microservice, job, partition, cron_expr
        );
        Ok(())
    }

    /// 测试辅助：把某个作业分区标记为立即到期
    pub async fn force_due(&self, microservice: &str, job: &str, partition: i32) {
        let mut entries = self.entries.write().await;
        for entry in entries.iter_mut() {
            if entry.microservice == microservice
                && entry.job == job
                && entry.partition == partition
            {
                entry.next_due = Some(Utc::now());
            }
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobScheduleStore for InMemoryJobStore {
    async fn due_jobs(&self, as_of: DateTime<Utc>) -> FrameworkResult<Vec<DueJob>> {
        let mut entries = self.entries.write().await;
        let mut due = Vec::new();

        for entry in entries.iter_mut() {
            if let Some(next_due) = entry.next_due {
                if next_due <= as_of {
                    due.push(DueJob {
                        microservice: entry.microservice.clone(),
                        job: entry.job.clone(),
                        partition: entry.partition,
                        // activation 是计划触发时刻，不是处理时刻
                        activation: next_due,
                    });
                    entry.next_due = entry.schedule.after(&as_of).next();
                }
            }
        }

        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_register_rejects_invalid_cron() {
        let store = InMemoryJobStore::new();
        let err = store
            .register("billing", "invoice-close", 0, "not a cron")
            .await
            .unwrap_err();
        assert!(matches!(err, FrameworkError::InvalidCron { .. }));
    }

    #[tokio::test]
    async fn test_due_jobs_returns_each_due_tuple_once() {
        let store = InMemoryJobStore::new();
        store
            .register("billing", "invoice-close", 0, "0 * * * * *")
            .await
            .unwrap();
        store
            .register("billing", "invoice-close", 1, "0 * * * * *")
            .await
            .unwrap();

        // 跳到下次到期之后
        let as_of = Utc::now() + Duration::minutes(2);
        let due = store.due_jobs(as_of).await.unwrap();
        assert_eq!(due.len(), 2);
        assert!(due.iter().any(|d| d.partition == 0));
        assert!(due.iter().any(|d| d.partition == 1));
        assert!(due.iter().all(|d| d.activation <= as_of));

        // 未再次到期前不重复返回
        let again = store.due_jobs(as_of).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_reregistration_replaces_entry() {
        let store = InMemoryJobStore::new();
        store
            .register("billing", "invoice-close", 0, "0 * * * * *")
            .await
            .unwrap();
        store
            .register("billing", "invoice-close", 0, "0 0 * * * *")
            .await
            .unwrap();

        let as_of = Utc::now() + Duration::minutes(2);
        let due = store.due_jobs(as_of).await.unwrap();
        // 每小时的计划在两分钟内最多到期一次
        assert!(due.len() <= 1);
    }
}
