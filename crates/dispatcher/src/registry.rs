use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use courier_config::Environment;
use courier_domain::{
    subscription_channel, EndpointKind, MessageBroker, MessageHandler, ProvisionRequest,
};
use courier_errors::{FrameworkError, FrameworkResult};

/// 环境限定的通道名改写
///
/// 纯函数、确定性、幂等：生产环境原样返回；非生产环境加 "{env}-" 前缀，
/// 已带前缀的名字不会二次加前缀。注册表与发送路径共用此规则。
pub fn rewrite_channel_name(raw: &str, environment: Environment) -> String {
    if environment.is_production() {
        return raw.to_string();
    }
    let prefix = format!("{}-", environment.name());
    if raw.starts_with(&prefix) {
        raw.to_string()
    } else {
        format!("{prefix}{raw}")
    }
}

/// 启动期登记的端点声明
///
/// 取代运行时扫描：每个绑定在启动时显式声明，校验失败即启动失败。
pub struct EndpointDeclaration {
    pub kind: EndpointKind,
    /// 逻辑通道名，未经环境改写
    pub channel: String,
    pub subscription: Option<String>,
    /// SQL风格过滤表达式，仅主题订阅可携带
    pub filter: Option<String>,
    pub max_concurrent_calls: usize,
    pub max_delivery_count: u32,
    pub delete_after_read: bool,
    pub handler: Arc<dyn MessageHandler>,
}

impl EndpointDeclaration {
    pub fn queue<C: Into<String>>(channel: C, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            kind: EndpointKind::Queue,
            channel: channel.into(),
            subscription: None,
            filter: None,
            max_concurrent_calls: 10,
            max_delivery_count: 5,
            delete_after_read: true,
            handler,
        }
    }

    pub fn topic<C, S>(channel: C, subscription: S, handler: Arc<dyn MessageHandler>) -> Self
    where
        C: Into<String>,
        S: Into<String>,
    {
        Self {
            kind: EndpointKind::Topic,
            channel: channel.into(),
            subscription: Some(subscription.into()),
            filter: None,
            max_concurrent_calls: 10,
            max_delivery_count: 5,
            delete_after_read: true,
            handler,
        }
    }

    pub fn with_filter<F: Into<String>>(mut self, filter: F) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max;
        self
    }

    pub fn with_max_delivery_count(mut self, max: u32) -> Self {
        self.max_delivery_count = max;
        self
    }

    /// 确认后保留消息（代理语义下可读不可再消费）
    pub fn keep_after_read(mut self) -> Self {
        self.delete_after_read = false;
        self
    }
}

/// 构建完成的端点绑定，含环境改写后的物理通道
pub struct EndpointBinding {
    pub kind: EndpointKind,
    /// 逻辑名，拦截记录与日志用
    pub tag_name: String,
    /// 环境改写后的物理通道名
    pub channel: String,
    pub subscription: Option<String>,
    pub filter: Option<String>,
    pub max_concurrent_calls: usize,
    pub max_delivery_count: u32,
    pub delete_after_read: bool,
    pub handler: Arc<dyn MessageHandler>,
}

impl EndpointBinding {
    /// 分发器实际接收的物理通道：队列即通道本身，主题为订阅通道
    pub fn receive_channel(&self) -> String {
        match (&self.kind, &self.subscription) {
            (EndpointKind::Topic, Some(sub)) => subscription_channel(&self.channel, sub),
            _ => self.channel.clone(),
        }
    }

    pub fn provision_request(&self) -> ProvisionRequest {
        ProvisionRequest {
            kind: self.kind,
            channel: self.channel.clone(),
            subscription: self.subscription.clone(),
            filter: self.filter.clone(),
        }
    }
}

// 处理器是 trait 对象，手写 Debug 只输出绑定元数据
impl std::fmt::Debug for EndpointBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointBinding")
            .field("kind", &self.kind)
            .field("tag_name", &self.tag_name)
            .field("channel", &self.channel)
            .field("subscription", &self.subscription)
            .field("filter", &self.filter)
            .field("max_concurrent_calls", &self.max_concurrent_calls)
            .field("max_delivery_count", &self.max_delivery_count)
            .field("delete_after_read", &self.delete_after_read)
            .finish()
    }
}

/// 端点绑定注册表；构建后不可变
pub struct BindingRegistry {
    environment: Environment,
    bindings: Vec<Arc<EndpointBinding>>,
}

impl BindingRegistry {
    pub fn builder(environment: Environment) -> BindingRegistryBuilder {
        BindingRegistryBuilder {
            environment,
            declarations: Vec::new(),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn bindings(&self) -> &[Arc<EndpointBinding>] {
        &self.bindings
    }

    /// 按类型、逻辑通道名和订阅名查找绑定
    pub fn resolve(
        &self,
        kind: EndpointKind,
        channel: &str,
        subscription: Option<&str>,
    ) -> FrameworkResult<&Arc<EndpointBinding>> {
        let physical = rewrite_channel_name(channel, self.environment);
        self.bindings
            .iter()
            .find(|b| {
                b.kind == kind && b.channel == physical && b.subscription.as_deref() == subscription
            })
            .ok_or_else(|| FrameworkError::BindingNotFound {
                channel: channel.to_string(),
            })
    }

    /// 启动期向代理置备全部绑定的通道/订阅
    pub async fn provision_all(&self, broker: &dyn MessageBroker) -> FrameworkResult<()> {
        for binding in &self.bindings {
            broker.provision(&binding.provision_request()).await?;
            info!(
                "置备端点: {:?} {} (并发上限 {})",
                binding.kind, binding.channel, binding.max_concurrent_calls
            );
        }
        Ok(())
    }
}

/// 注册表构建器；build 时统一校验，任何违规都是启动期致命错误
pub struct BindingRegistryBuilder {
    environment: Environment,
    declarations: Vec<EndpointDeclaration>,
}

impl BindingRegistryBuilder {
    pub fn declare(mut self, declaration: EndpointDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn build(self) -> FrameworkResult<BindingRegistry> {
        let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
        let mut bindings = Vec::with_capacity(self.declarations.len());

        for decl in self.declarations {
            if decl.channel.is_empty() {
                return Err(FrameworkError::config_error("端点声明的通道名不能为空"));
            }
            if decl.kind == EndpointKind::Topic
                && decl.subscription.as_deref().unwrap_or("").is_empty()
            {
                return Err(FrameworkError::config_error(format!(
                    "主题 {} 的订阅名不能为空",
                    decl.channel
                )));
            }
            if decl.kind == EndpointKind::Queue && decl.subscription.is_some() {
                return Err(FrameworkError::config_error(format!(
                    "队列 {} 不能声明订阅名",
                    decl.channel
                )));
            }
            if decl.max_concurrent_calls == 0 {
                return Err(FrameworkError::config_error(format!(
                    "端点 {} 的并发上限必须大于0",
                    decl.channel
                )));
            }
            if decl.max_delivery_count == 0 {
                return Err(FrameworkError::config_error(format!(
                    "端点 {} 的最大投递次数必须大于0",
                    decl.channel
                )));
            }

            let physical = rewrite_channel_name(&decl.channel, self.environment);
            if !seen.insert((physical.clone(), decl.subscription.clone())) {
                return Err(FrameworkError::config_error(format!(
                    "重复的端点绑定: {} (订阅 {:?})",
                    physical, decl.subscription
                )));
            }

            bindings.push(Arc::new(EndpointBinding {
                kind: decl.kind,
                tag_name: decl.channel,
                channel: physical,
                subscription: decl.subscription,
                filter: decl.filter,
                max_concurrent_calls: decl.max_concurrent_calls,
                max_delivery_count: decl.max_delivery_count,
                delete_after_read: decl.delete_after_read,
                handler: decl.handler,
            }));
        }

        Ok(BindingRegistry {
            environment: self.environment,
            bindings,
        })
    }
}
