use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_errors::{FrameworkError, FrameworkResult};

use crate::scheduled_job::ScheduledJob;

/// 随令牌附带的用户声明，解码细节由外部协作者负责
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserClaims {
    pub subject: String,
    pub display_name: Option<String>,
    pub roles: Vec<String>,
}

/// 事务上下文：一次逻辑操作的身份与操作号
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionContext {
    pub operation_id: String,
    pub user: Option<UserClaims>,
}

impl TransactionContext {
    pub fn anonymous<S: Into<String>>(operation_id: S) -> Self {
        Self {
            operation_id: operation_id.into(),
            user: None,
        }
    }

    pub fn from_claims<S: Into<String>>(operation_id: S, claims: UserClaims) -> Self {
        Self {
            operation_id: operation_id.into(),
            user: Some(claims),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none()
    }
}

/// 业务消息命令，封闭枚举加静态查找表
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BusinessCommand {
    Create,
    Update,
    Delete,
    Notify,
}

impl BusinessCommand {
    pub fn from_code(code: &str) -> FrameworkResult<Self> {
        match code {
            "Create" => Ok(BusinessCommand::Create),
            "Update" => Ok(BusinessCommand::Update),
            "Delete" => Ok(BusinessCommand::Delete),
            "Notify" => Ok(BusinessCommand::Notify),
            other => Err(FrameworkError::unknown_command("business", other)),
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            BusinessCommand::Create => "Create",
            BusinessCommand::Update => "Update",
            BusinessCommand::Delete => "Delete",
            BusinessCommand::Notify => "Notify",
        }
    }
}

/// 信封载荷：调度触发或业务消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EnvelopeBody {
    Job(ScheduledJob),
    Business {
        message_type: String,
        /// 字符串命令代码，消费端对照封闭枚举校验；空值合法
        command_code: Option<String>,
        payload: serde_json::Value,
    },
}

/// 队列/主题与调度触发路径上交换的版本化工作单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub operation_id: String,
    pub microservice: String,
    pub body: EnvelopeBody,
    /// 惰性物化：缺失时由附带声明派生，或保持匿名
    pub transaction_context: Option<TransactionContext>,
    pub auth_claims: Option<UserClaims>,
    /// 应用于逻辑时钟的有符号偏移
    pub clock_displacement: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl MessageEnvelope {
    pub fn business<M, T>(microservice: M, message_type: T, payload: serde_json::Value) -> Self
    where
        M: Into<String>,
        T: Into<String>,
    {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            microservice: microservice.into(),
            body: EnvelopeBody::Business {
                message_type: message_type.into(),
                command_code: None,
                payload,
            },
            transaction_context: None,
            auth_claims: None,
            clock_displacement: None,
            timestamp: Utc::now(),
        }
    }

    pub fn job<M: Into<String>>(microservice: M, job: ScheduledJob) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            microservice: microservice.into(),
            body: EnvelopeBody::Job(job),
            transaction_context: None,
            auth_claims: None,
            clock_displacement: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_operation_id<S: Into<String>>(mut self, operation_id: S) -> Self {
        self.operation_id = operation_id.into();
        self
    }

    pub fn with_claims(mut self, claims: UserClaims) -> Self {
        self.auth_claims = Some(claims);
        self
    }

    pub fn with_clock_displacement(mut self, displacement: i64) -> Self {
        self.clock_displacement = Some(displacement);
        self
    }

    /// 设置业务命令代码，构造期对照封闭枚举校验
    pub fn with_command_code<S: Into<String>>(mut self, code: S) -> FrameworkResult<Self> {
        let code = code.into();
        match &mut self.body {
            EnvelopeBody::Business { command_code, .. } => {
                if code.is_empty() {
                    *command_code = None;
                } else {
                    BusinessCommand::from_code(&code)?;
                    *command_code = Some(code);
                }
                Ok(self)
            }
            EnvelopeBody::Job(_) => Err(FrameworkError::Internal(
                "作业信封的命令由 ScheduledJob 携带".to_string(),
            )),
        }
    }

    /// 校验命令代码可解析为声明的命令之一（或为空）
    pub fn validate_command(&self) -> FrameworkResult<()> {
        match &self.body {
            // 作业命令是类型化枚举，反序列化成功即合法
            EnvelopeBody::Job(_) => Ok(()),
            EnvelopeBody::Business { command_code, .. } => match command_code {
                Some(code) if !code.is_empty() => BusinessCommand::from_code(code).map(|_| ()),
                _ => Ok(()),
            },
        }
    }

    pub fn command(&self) -> FrameworkResult<Option<BusinessCommand>> {
        match &self.body {
            EnvelopeBody::Business {
                command_code: Some(code),
                ..
            } if !code.is_empty() => Ok(Some(BusinessCommand::from_code(code)?)),
            _ => Ok(None),
        }
    }

    /// 惰性物化事务上下文：已有则复用，否则由附带声明派生或保持匿名
    pub fn materialize_context(&mut self) -> &TransactionContext {
        let operation_id = self.operation_id.clone();
        let claims = self.auth_claims.clone();
        self.transaction_context.get_or_insert_with(|| match claims {
            Some(claims) => TransactionContext::from_claims(operation_id, claims),
            None => TransactionContext::anonymous(operation_id),
        })
    }

    pub fn message_type_name(&self) -> &str {
        match &self.body {
            EnvelopeBody::Job(_) => "ScheduledJobMSG",
            EnvelopeBody::Business { message_type, .. } => message_type,
        }
    }

    pub fn serialize_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_business_envelope_creation() {
        let envelope =
            MessageEnvelope::business("orders", "OrderPlacedMSG", json!({"order_id": 42}));

        assert!(!envelope.operation_id.is_empty());
        assert_eq!(envelope.microservice, "orders");
        assert_eq!(envelope.message_type_name(), "OrderPlacedMSG");
        assert!(envelope.transaction_context.is_none());
        assert!(envelope.command().unwrap().is_none());
    }

    #[test]
    fn test_command_code_validated_at_construction() {
        let envelope = MessageEnvelope::business("orders", "OrderPlacedMSG", json!({}))
            .with_command_code("Create")
            .unwrap();
        assert_eq!(envelope.command().unwrap(), Some(BusinessCommand::Create));

        let err = MessageEnvelope::business("orders", "OrderPlacedMSG", json!({}))
            .with_command_code("Teleport")
            .unwrap_err();
        assert!(matches!(err, FrameworkError::UnknownCommand { .. }));

        // 空代码合法，表示无命令
        let envelope = MessageEnvelope::business("orders", "OrderPlacedMSG", json!({}))
            .with_command_code("")
            .unwrap();
        assert!(envelope.command().unwrap().is_none());
    }

    #[test]
    fn test_validate_command_rejects_tampered_code() {
        let mut envelope = MessageEnvelope::business("orders", "OrderPlacedMSG", json!({}));
        if let EnvelopeBody::Business { command_code, .. } = &mut envelope.body {
            *command_code = Some("Explode".to_string());
        }
        assert!(envelope.validate_command().is_err());
    }

    #[test]
    fn test_context_materialization_is_lazy_and_stable() {
        let claims = UserClaims {
            subject: "user-1".to_string(),
            display_name: Some("Alice".to_string()),
            roles: vec!["operator".to_string()],
        };
        let mut envelope = MessageEnvelope::business("orders", "OrderPlacedMSG", json!({}))
            .with_claims(claims.clone());

        let context = envelope.materialize_context().clone();
        assert_eq!(context.operation_id, envelope.operation_id);
        assert_eq!(context.user, Some(claims));

        // 再次物化复用同一个上下文
        assert_eq!(envelope.materialize_context(), &context);
    }

    #[test]
    fn test_anonymous_context_without_claims() {
        let mut envelope = MessageEnvelope::business("orders", "OrderPlacedMSG", json!({}));
        assert!(envelope.materialize_context().is_anonymous());
    }

    #[test]
    fn test_envelope_round_trip() {
        let job = ScheduledJob::trigger("billing", "invoice-close", 2, Utc::now());
        let envelope = MessageEnvelope::job("billing", job).with_operation_id("op-7");

        let bytes = envelope.serialize_bytes().unwrap();
        let decoded = MessageEnvelope::deserialize_bytes(&bytes).unwrap();

        assert_eq!(decoded.operation_id, "op-7");
        assert_eq!(decoded.message_type_name(), "ScheduledJobMSG");
        match decoded.body {
            EnvelopeBody::Job(decoded_job) => {
                assert_eq!(decoded_job.identity(), ("billing", "invoice-close", 2));
            }
            _ => panic!("expected job body"),
        }
    }
}
