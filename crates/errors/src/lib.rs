use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("未知命令代码: {code} (消息类别: {kind})")]
    UnknownCommand { kind: String, code: String },
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("消息代理错误: {0}")]
    MessageBroker(String),
    #[error("通道未找到: {0}")]
    ChannelNotFound(String),
    #[error("端点绑定未找到: {channel}")]
    BindingNotFound { channel: String },
    #[error("处理器执行失败: {0}")]
    HandlerFailed(String),
    #[error("消息已进入死信通道: {reason}")]
    DeadLettered { reason: String },
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type FrameworkResult<T> = Result<T, FrameworkError>;

impl FrameworkError {
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn broker_error<S: Into<String>>(msg: S) -> Self {
        Self::MessageBroker(msg.into())
    }
    pub fn handler_error<S: Into<String>>(msg: S) -> Self {
        Self::HandlerFailed(msg.into())
    }
    pub fn unknown_command<K: Into<String>, C: Into<String>>(kind: K, code: C) -> Self {
        Self::UnknownCommand {
            kind: kind.into(),
            code: code.into(),
        }
    }
    /// 致命错误：启动期失败或无法通过重投递修复的消息
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FrameworkError::Configuration(_)
                | FrameworkError::UnknownCommand { .. }
                | FrameworkError::Serialization(_)
                | FrameworkError::DeadLettered { .. }
                | FrameworkError::Internal(_)
        )
    }
    /// 可重试错误：依赖代理的重投递机制
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FrameworkError::MessageBroker(_)
                | FrameworkError::HandlerFailed(_)
                | FrameworkError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for FrameworkError {
    fn from(err: serde_json::Error) -> Self {
        FrameworkError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for FrameworkError {
    fn from(err: anyhow::Error) -> Self {
        FrameworkError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
