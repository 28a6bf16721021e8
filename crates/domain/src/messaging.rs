use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_errors::FrameworkResult;

use crate::critics::CriticHandler;
use crate::envelope::{MessageEnvelope, TransactionContext};

/// 端点类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Queue,
    Topic,
}

/// 主题订阅对应的物理接收通道名，注册表与各代理实现共用同一规则
pub fn subscription_channel(topic: &str, subscription: &str) -> String {
    format!("{topic}/{subscription}")
}

/// 一次入站投递及其确认所需的句柄信息
#[derive(Debug, Clone)]
pub struct Delivery {
    pub channel: String,
    pub payload: Vec<u8>,
    /// 代理维护的投递次数，首次投递为 1
    pub delivery_count: u32,
    /// 代理强制的会话/分区标识，同一会话内串行处理
    pub session_id: Option<String>,
    pub delivery_tag: u64,
}

/// 启动期置备请求，由端点绑定推导
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRequest {
    pub kind: EndpointKind,
    pub channel: String,
    pub subscription: Option<String>,
    pub filter: Option<String>,
}

/// 消息代理契约（外部协作者，仅通过此窄接口访问）
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// 发送序列化信封到物理通道
    async fn send(
        &self,
        channel: &str,
        payload: &[u8],
        ttl: Option<Duration>,
    ) -> FrameworkResult<()>;

    /// 接收一条投递；通道为空时返回 None
    async fn receive(&self, channel: &str) -> FrameworkResult<Option<Delivery>>;

    /// 确认处理完成；delete_after_read 为 false 时消息按代理语义保持可见
    async fn ack(&self, delivery: &Delivery, delete_after_read: bool) -> FrameworkResult<()>;

    /// 拒绝并交还代理重投递
    async fn nack(&self, delivery: &Delivery) -> FrameworkResult<()>;

    /// 终态移除到死信通道，原因中必须包含人类可读说明
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> FrameworkResult<()>;

    /// 显式置备通道/订阅/过滤器
    async fn provision(&self, request: &ProvisionRequest) -> FrameworkResult<()>;

    /// 通道当前深度
    async fn channel_depth(&self, channel: &str) -> FrameworkResult<u32>;

    /// 清空通道
    async fn purge_channel(&self, channel: &str) -> FrameworkResult<()>;
}

/// 到期作业条目
#[derive(Debug, Clone, PartialEq)]
pub struct DueJob {
    pub microservice: String,
    pub job: String,
    pub partition: i32,
    pub activation: DateTime<Utc>,
}

/// 作业计划存储契约（外部协作者）
#[async_trait]
pub trait JobScheduleStore: Send + Sync {
    /// 返回截至 as_of 已到期的 (微服务, 作业, 分区) 元组
    async fn due_jobs(&self, as_of: DateTime<Utc>) -> FrameworkResult<Vec<DueJob>>;
}

/// 消息目录查找（外部协作者）；未命中返回 None，回退策略由聚合器负责
pub trait Localizer: Send + Sync {
    fn localize(&self, code: &str, args: &[&str]) -> Option<String>;
}

/// 绑定到通道的消息处理器
///
/// 业务结果走批注聚合器；返回 Err 表示意外失败，进入重试/死信路径。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        envelope: &MessageEnvelope,
        context: &TransactionContext,
        critics: &mut CriticHandler,
    ) -> FrameworkResult<()>;
}
