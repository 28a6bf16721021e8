use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::TcpListener;
use tracing::{info, warn};

use courier_api::{create_routes, AppState};
use courier_config::{AppConfig, BrokerKind};
use courier_dispatcher::{
    BindingRegistry, DispatcherEngine, EndpointDeclaration, JobDispatcher, MessageSender,
};
use courier_domain::{
    CriticHandler, EnvelopeBody, JobCommand, MessageBroker, MessageEnvelope, MessageHandler,
    TransactionContext,
};
use courier_errors::FrameworkResult;
use courier_infrastructure::{
    CatalogLocalizer, InMemoryBroker, InMemoryJobStore, InterceptionSink, RabbitMqBroker,
};

use crate::shutdown::ShutdownManager;

/// 宿主微服务对公共作业通道的默认绑定：记录收到的触发与中止。
/// 具体业务作业处理器通过注册表替换或补充此绑定。
struct JobActivationHandler;

#[async_trait]
impl MessageHandler for JobActivationHandler {
    async fn handle(
        &self,
        envelope: &MessageEnvelope,
        context: &TransactionContext,
        _critics: &mut CriticHandler,
    ) -> FrameworkResult<()> {
        match &envelope.body {
            EnvelopeBody::Job(job) => match job.command {
                JobCommand::Trigger => info!(
                    "收到作业触发: {}/{} 分区 {} (operation_id={})",
                    job.microservice, job.job, job.partition, context.operation_id
                ),
                JobCommand::Abort => info!(
                    "收到作业中止: {}/{} 分区 {} (operation_id={})",
                    job.microservice, job.job, job.partition, context.operation_id
                ),
            },
            EnvelopeBody::Business { message_type, .. } => {
                warn!("作业通道收到业务消息，忽略: type={}", message_type);
            }
        }
        Ok(())
    }
}

/// 主应用程序：装配代理、拦截槽、注册表、分发器和管理面
pub struct Application {
    config: AppConfig,
    sink: Arc<InterceptionSink>,
    registry: Arc<BindingRegistry>,
    engine: Arc<DispatcherEngine>,
    job_dispatcher: Arc<JobDispatcher>,
}

impl Application {
    pub async fn build(config: AppConfig) -> Result<Self> {
        info!(
            "初始化应用: microservice={}, environment={}",
            config.microservice,
            config.environment.name()
        );

        let broker: Arc<dyn MessageBroker> = match config.broker.kind {
            BrokerKind::Rabbitmq => Arc::new(
                RabbitMqBroker::new(&config.broker.url)
                    .await
                    .context("连接消息代理失败")?,
            ),
            BrokerKind::InMemory => Arc::new(InMemoryBroker::new()),
        };

        let sink = Arc::new(InterceptionSink::new(
            config.environment,
            config.interception.enabled,
        ));
        let localizer = Arc::new(CatalogLocalizer::new());
        let sender = Arc::new(
            MessageSender::new(Arc::clone(&broker), config.environment)
                .with_interception(Arc::clone(&sink)),
        );
        let store = Arc::new(InMemoryJobStore::new());

        let registry = Arc::new(
            BindingRegistry::builder(config.environment)
                .declare(
                    EndpointDeclaration::queue(
                        &config.broker.jobs_channel,
                        Arc::new(JobActivationHandler),
                    )
                    .with_max_concurrent_calls(config.dispatcher.default_max_concurrent_calls)
                    .with_max_delivery_count(config.dispatcher.default_max_delivery_count),
                )
                .build()
                .context("构建端点绑定注册表失败")?,
        );
        registry
            .provision_all(broker.as_ref())
            .await
            .context("置备端点失败")?;

        let engine = Arc::new(
            DispatcherEngine::new(Arc::clone(&broker), config.dispatcher.clone())
                .with_localizer(localizer),
        );
        let job_dispatcher = Arc::new(JobDispatcher::new(
            store,
            sender,
            config.broker.jobs_channel.clone(),
            config.scheduler.clone(),
        ));

        Ok(Self {
            config,
            sink,
            registry,
            engine,
            job_dispatcher,
        })
    }

    /// 启动全部组件并运行到收到关闭信号
    pub async fn run(&self, shutdown: &ShutdownManager) -> Result<()> {
        let workers = self.engine.spawn_workers(&self.registry, shutdown.sender());
        info!("分发工作者已启动: {} 个绑定", workers.len());

        let scheduler_handle = {
            let dispatcher = Arc::clone(&self.job_dispatcher);
            let rx = shutdown.subscribe();
            tokio::spawn(async move { dispatcher.run(rx).await })
        };

        let state = AppState {
            sink: Arc::clone(&self.sink),
            microservice: self.config.microservice.clone(),
        };
        let router = create_routes(state);

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定管理面地址失败: {}", self.config.api.bind_address))?;
        info!("管理面监听: {}", self.config.api.bind_address);

        let mut rx = shutdown.subscribe();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
            })
            .await
            .context("管理面服务异常退出")?;

        scheduler_handle.await.context("作业调度器异常退出")?;
        for worker in workers {
            worker.await.context("分发工作者异常退出")?;
        }

        info!("全部组件已停止");
        Ok(())
    }
}
