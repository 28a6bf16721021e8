#[cfg(test)]
mod error_tests {
    use crate::*;

    #[test]
    fn test_framework_error_display() {
        let config_error = FrameworkError::Configuration("missing broker url".to_string());
        assert_eq!(config_error.to_string(), "配置错误: missing broker url");

        let command_error = FrameworkError::unknown_command("job", "Restart");
        assert_eq!(
            command_error.to_string(),
            "未知命令代码: Restart (消息类别: job)"
        );

        let broker_error = FrameworkError::MessageBroker("connection refused".to_string());
        assert_eq!(broker_error.to_string(), "消息代理错误: connection refused");

        let binding_error = FrameworkError::BindingNotFound {
            channel: "orders".to_string(),
        };
        assert_eq!(binding_error.to_string(), "端点绑定未找到: orders");

        let dead_letter = FrameworkError::DeadLettered {
            reason: "decode failed".to_string(),
        };
        assert_eq!(dead_letter.to_string(), "消息已进入死信通道: decode failed");

        let cron_error = FrameworkError::InvalidCron {
            expr: "* * *".to_string(),
            message: "too few fields".to_string(),
        };
        assert_eq!(
            cron_error.to_string(),
            "无效的CRON表达式: * * * - too few fields"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(FrameworkError::config_error("bad binding").is_fatal());
        assert!(FrameworkError::unknown_command("business", "X").is_fatal());
        assert!(FrameworkError::Serialization("bad json".to_string()).is_fatal());
        assert!(!FrameworkError::config_error("bad binding").is_retryable());

        assert!(FrameworkError::broker_error("timeout").is_retryable());
        assert!(FrameworkError::handler_error("dependency down").is_retryable());
        assert!(FrameworkError::Timeout("receive".to_string()).is_retryable());
        assert!(!FrameworkError::broker_error("timeout").is_fatal());
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let framework_error: FrameworkError = json_error.into();
        assert!(matches!(framework_error, FrameworkError::Serialization(_)));
        assert!(framework_error.is_fatal());
    }

    #[test]
    fn test_anyhow_error_conversion() {
        let anyhow_error = anyhow::anyhow!("wiring failed");
        let framework_error: FrameworkError = anyhow_error.into();
        assert!(matches!(framework_error, FrameworkError::Internal(_)));
        assert_eq!(framework_error.to_string(), "内部错误: wiring failed");
    }
}
