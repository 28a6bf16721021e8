//! 作业调度分发集成测试：到期触发、分区传播和中止语义。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;

use courier_config::{Environment, SchedulerConfig};
use courier_dispatcher::{JobDispatcher, MessageSender};
use courier_domain::{DueJob, EnvelopeBody, JobCommand, MessageBroker, MessageEnvelope};
use courier_errors::FrameworkError;
use courier_infrastructure::{InMemoryBroker, InMemoryJobStore};
use courier_testing_utils::{MockBroker, MockScheduleStore};

const JOBS_CHANNEL: &str = "scheduled-jobs";

fn dispatcher(
    broker: Arc<InMemoryBroker>,
    store: Arc<InMemoryJobStore>,
) -> JobDispatcher {
    let sender = Arc::new(MessageSender::new(broker, Environment::Production));
    JobDispatcher::new(store, sender, JOBS_CHANNEL, SchedulerConfig::default())
}

async fn receive_job(broker: &InMemoryBroker) -> MessageEnvelope {
    let delivery = broker
        .receive(JOBS_CHANNEL)
        .await
        .unwrap()
        .expect("expected a job envelope on the jobs channel");
    broker.ack(&delivery, true).await.unwrap();
    MessageEnvelope::deserialize_bytes(&delivery.payload).unwrap()
}

#[tokio::test]
async fn test_tick_publishes_trigger_with_partition() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(InMemoryJobStore::new());
    store
        .register("billing", "invoice-close", 3, "0 0 * * * *")
        .await
        .unwrap();
    store.force_due("billing", "invoice-close", 3).await;

    let dispatcher = dispatcher(broker.clone(), store);
    let dispatched = dispatcher.tick().await.unwrap();
    assert_eq!(dispatched, 1);

    let envelope = receive_job(&broker).await;
    assert_eq!(envelope.microservice, "billing");
    assert_eq!(envelope.message_type_name(), "ScheduledJobMSG");
    match envelope.body {
        EnvelopeBody::Job(job) => {
            assert_eq!(job.identity(), ("billing", "invoice-close", 3));
            assert_eq!(job.command, JobCommand::Trigger);
        }
        other => panic!("expected job body, got {other:?}"),
    }
}

#[tokio::test]
async fn test_tick_without_due_jobs_publishes_nothing() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(InMemoryJobStore::new());
    store
        .register("billing", "invoice-close", 0, "0 0 * * * *")
        .await
        .unwrap();

    let dispatcher = dispatcher(broker.clone(), store);
    // 注册后尚未到期（下次整点），本轮不应有任何触发
    let dispatched = dispatcher.tick().await.unwrap();
    assert_eq!(dispatched, 0);
    assert!(broker.receive(JOBS_CHANNEL).await.unwrap().is_none());
}

#[tokio::test]
async fn test_each_due_partition_gets_own_trigger() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(InMemoryJobStore::new());
    for partition in 0..3 {
        store
            .register("billing", "invoice-close", partition, "0 0 * * * *")
            .await
            .unwrap();
        store.force_due("billing", "invoice-close", partition).await;
    }

    let dispatcher = dispatcher(broker.clone(), store);
    assert_eq!(dispatcher.tick().await.unwrap(), 3);

    let mut partitions = Vec::new();
    for _ in 0..3 {
        let envelope = receive_job(&broker).await;
        if let EnvelopeBody::Job(job) = envelope.body {
            partitions.push(job.partition);
        }
    }
    partitions.sort_unstable();
    assert_eq!(partitions, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_abort_does_not_retract_published_trigger() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(InMemoryJobStore::new());
    store
        .register("billing", "invoice-close", 1, "0 0 * * * *")
        .await
        .unwrap();
    store.force_due("billing", "invoice-close", 1).await;

    let dispatcher = dispatcher(broker.clone(), store);
    assert_eq!(dispatcher.tick().await.unwrap(), 1);

    // 中止是追加的协作信号，不撤回已发布的触发
    dispatcher.abort("billing", "invoice-close", 1).await.unwrap();
    assert_eq!(broker.channel_depth(JOBS_CHANNEL).await.unwrap(), 2);

    let first = receive_job(&broker).await;
    let second = receive_job(&broker).await;
    match (first.body, second.body) {
        (EnvelopeBody::Job(trigger), EnvelopeBody::Job(abort)) => {
            assert_eq!(trigger.command, JobCommand::Trigger);
            assert_eq!(abort.command, JobCommand::Abort);
            assert_eq!(abort.identity(), ("billing", "invoice-close", 1));
        }
        _ => panic!("expected two job envelopes"),
    }
}

#[tokio::test]
async fn test_failed_tuple_does_not_stop_remaining_tuples() {
    fn due(partition: i32) -> DueJob {
        DueJob {
            microservice: "billing".to_string(),
            job: "invoice-close".to_string(),
            partition,
            activation: Utc::now(),
        }
    }

    let mut store = MockScheduleStore::new();
    store
        .expect_due_jobs()
        .returning(|_| Ok(vec![due(0), due(1), due(2)]));

    // 第一个元组发布被代理拒绝，其余成功
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = attempts.clone();
    let mut broker = MockBroker::new();
    broker.expect_send().times(3).returning(move |_, _, _| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(FrameworkError::broker_error("publish refused"))
        } else {
            Ok(())
        }
    });

    let sender = Arc::new(MessageSender::new(
        Arc::new(broker),
        Environment::Production,
    ));
    let dispatcher = JobDispatcher::new(
        Arc::new(store),
        sender,
        JOBS_CHANNEL,
        SchedulerConfig::default(),
    );

    // 失败的元组只记录日志，本轮剩余元组照常触发
    assert_eq!(dispatcher.tick().await.unwrap(), 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_scheduler_respects_environment_rewrite() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(InMemoryJobStore::new());
    store
        .register("billing", "invoice-close", 0, "0 0 * * * *")
        .await
        .unwrap();
    store.force_due("billing", "invoice-close", 0).await;

    let sender = Arc::new(MessageSender::new(broker.clone(), Environment::Qa));
    let dispatcher = JobDispatcher::new(store, sender, JOBS_CHANNEL, SchedulerConfig::default());
    assert_eq!(dispatcher.tick().await.unwrap(), 1);

    assert_eq!(broker.channel_depth("qa-scheduled-jobs").await.unwrap(), 1);
}
