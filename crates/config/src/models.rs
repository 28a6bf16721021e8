use courier_errors::{FrameworkError, FrameworkResult};
use serde::{Deserialize, Serialize};

/// 部署环境；非生产环境会对通道名做环境限定改写
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Qa,
    #[default]
    Development,
    Integration,
}

impl Environment {
    pub fn name(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Qa => "qa",
            Environment::Development => "development",
            Environment::Integration => "integration",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// 拦截只允许在开发/集成环境开启
    pub fn allows_interception(&self) -> bool {
        matches!(self, Environment::Development | Environment::Integration)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Rabbitmq,
    #[default]
    InMemory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub kind: BrokerKind,
    pub url: String,
    /// 调度作业的公共通道
    pub jobs_channel: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: BrokerKind::InMemory,
            url: "amqp://localhost:5672".to_string(),
            jobs_channel: "scheduled-jobs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 绑定未声明时的并发上限
    pub default_max_concurrent_calls: usize,
    /// 绑定未声明时的最大投递次数，超过即死信
    pub default_max_delivery_count: u32,
    /// 通道为空时的轮询间隔
    pub poll_interval_ms: u64,
    /// 优雅排空的宽限期
    pub shutdown_grace_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_max_concurrent_calls: 10,
            default_max_delivery_count: 5,
            poll_interval_ms: 100,
            shutdown_grace_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InterceptionConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub environment: Environment,
    pub microservice: String,
    pub broker: BrokerConfig,
    pub dispatcher: DispatcherConfig,
    pub scheduler: SchedulerConfig,
    pub interception: InterceptionConfig,
    pub api: ApiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            microservice: "courier".to_string(),
            broker: BrokerConfig::default(),
            dispatcher: DispatcherConfig::default(),
            scheduler: SchedulerConfig::default(),
            interception: InterceptionConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> FrameworkResult<()> {
        if self.microservice.is_empty() {
            return Err(FrameworkError::config_error("microservice 不能为空"));
        }
        if self.broker.jobs_channel.is_empty() {
            return Err(FrameworkError::config_error("broker.jobs_channel 不能为空"));
        }
        if self.broker.kind == BrokerKind::Rabbitmq && self.broker.url.is_empty() {
            return Err(FrameworkError::config_error(
                "broker.url 在 rabbitmq 模式下不能为空",
            ));
        }
        if self.dispatcher.default_max_concurrent_calls == 0 {
            return Err(FrameworkError::config_error(
                "dispatcher.default_max_concurrent_calls 必须大于0",
            ));
        }
        if self.dispatcher.default_max_delivery_count == 0 {
            return Err(FrameworkError::config_error(
                "dispatcher.default_max_delivery_count 必须大于0",
            ));
        }
        if self.scheduler.tick_interval_seconds == 0 {
            return Err(FrameworkError::config_error(
                "scheduler.tick_interval_seconds 必须大于0",
            ));
        }
        if self.interception.enabled && !self.environment.allows_interception() {
            return Err(FrameworkError::config_error(
                "拦截只能在 development/integration 环境开启",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatcher.default_max_concurrent_calls, 10);
        assert_eq!(config.dispatcher.default_max_delivery_count, 5);
        assert_eq!(config.broker.jobs_channel, "scheduled-jobs");
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = AppConfig::default();
        config.dispatcher.default_max_concurrent_calls = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interception_gated_by_environment() {
        let mut config = AppConfig::default();
        config.interception.enabled = true;
        config.environment = Environment::Development;
        assert!(config.validate().is_ok());

        config.environment = Environment::Production;
        assert!(config.validate().is_err());

        config.environment = Environment::Integration;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_names() {
        assert_eq!(Environment::Qa.name(), "qa");
        assert!(!Environment::Qa.is_production());
        assert!(Environment::Production.is_production());
        assert!(!Environment::Production.allows_interception());
        assert!(!Environment::Qa.allows_interception());
    }

    #[test]
    fn test_toml_deserialization_with_partial_fields() {
        let raw = r#"
            environment = "qa"
            microservice = "orders"

            [dispatcher]
            default_max_delivery_count = 3
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.environment, Environment::Qa);
        assert_eq!(config.microservice, "orders");
        assert_eq!(config.dispatcher.default_max_delivery_count, 3);
        // 未给出的字段取默认值
        assert_eq!(config.dispatcher.default_max_concurrent_calls, 10);
        assert_eq!(config.broker.kind, BrokerKind::InMemory);
    }
}
