use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;

use courier_domain::{Delivery, DueJob, JobScheduleStore, MessageBroker, ProvisionRequest};
use courier_errors::FrameworkResult;

mock! {
    pub Broker {}

    #[async_trait]
    impl MessageBroker for Broker {
        async fn send(
            &self,
            channel: &str,
            payload: &[u8],
            ttl: Option<Duration>,
        ) -> FrameworkResult<()>;
        async fn receive(&self, channel: &str) -> FrameworkResult<Option<Delivery>>;
        async fn ack(&self, delivery: &Delivery, delete_after_read: bool) -> FrameworkResult<()>;
        async fn nack(&self, delivery: &Delivery) -> FrameworkResult<()>;
        async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> FrameworkResult<()>;
        async fn provision(&self, request: &ProvisionRequest) -> FrameworkResult<()>;
        async fn channel_depth(&self, channel: &str) -> FrameworkResult<u32>;
        async fn purge_channel(&self, channel: &str) -> FrameworkResult<()>;
    }
}

mock! {
    pub ScheduleStore {}

    #[async_trait]
    impl JobScheduleStore for ScheduleStore {
        async fn due_jobs(&self, as_of: DateTime<Utc>) -> FrameworkResult<Vec<DueJob>>;
    }
}
