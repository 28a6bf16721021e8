use chrono::Utc;
use serde_json::json;

use courier_domain::{MessageEnvelope, ScheduledJob, UserClaims};

/// 带固定操作号的业务信封
pub fn business_envelope(operation_id: &str, message_type: &str) -> MessageEnvelope {
    MessageEnvelope::business("orders", message_type, json!({"order_id": 42}))
        .with_operation_id(operation_id)
}

/// 带固定操作号的作业触发信封
pub fn job_envelope(operation_id: &str, microservice: &str, job: &str, partition: i32) -> MessageEnvelope {
    let scheduled = ScheduledJob::trigger(microservice, job, partition, Utc::now());
    MessageEnvelope::job(microservice, scheduled).with_operation_id(operation_id)
}

/// 标准的操作员声明
pub fn operator_claims(subject: &str) -> UserClaims {
    UserClaims {
        subject: subject.to_string(),
        display_name: Some(format!("{subject} (test)")),
        roles: vec!["operator".to_string()],
    }
}
