use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_errors::{FrameworkError, FrameworkResult};

/// 调度作业命令，封闭枚举，未知代码在构造期失败
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobCommand {
    Trigger,
    Abort,
}

impl JobCommand {
    /// 静态代码 -> 变体查找表
    pub fn from_code(code: &str) -> FrameworkResult<Self> {
        match code {
            "Trigger" => Ok(JobCommand::Trigger),
            "Abort" => Ok(JobCommand::Abort),
            other => Err(FrameworkError::unknown_command("job", other)),
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            JobCommand::Trigger => "Trigger",
            JobCommand::Abort => "Abort",
        }
    }
}

/// 调度作业分发单元
///
/// 作业由 (microservice, job, partition) 唯一标识；activation 记录的是
/// 触发被安排的时刻，而不是实际被处理的时刻。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledJob {
    pub microservice: String,
    pub job: String,
    pub partition: i32,
    pub activation: DateTime<Utc>,
    pub command: JobCommand,
}

impl ScheduledJob {
    pub fn trigger<M: Into<String>, J: Into<String>>(
        microservice: M,
        job: J,
        partition: i32,
        activation: DateTime<Utc>,
    ) -> Self {
        Self {
            microservice: microservice.into(),
            job: job.into(),
            partition,
            activation,
            command: JobCommand::Trigger,
        }
    }

    pub fn abort<M: Into<String>, J: Into<String>>(
        microservice: M,
        job: J,
        partition: i32,
    ) -> Self {
        Self {
            microservice: microservice.into(),
            job: job.into(),
            partition,
            activation: Utc::now(),
            command: JobCommand::Abort,
        }
    }

    /// 作业身份三元组
    pub fn identity(&self) -> (&str, &str, i32) {
        (&self.microservice, &self.job, self.partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_command_code_lookup() {
        assert_eq!(JobCommand::from_code("Trigger").unwrap(), JobCommand::Trigger);
        assert_eq!(JobCommand::from_code("Abort").unwrap(), JobCommand::Abort);

        let err = JobCommand::from_code("Restart").unwrap_err();
        assert!(matches!(err, FrameworkError::UnknownCommand { .. }));
    }

    #[test]
    fn test_identity_tuple() {
        let job = ScheduledJob::trigger("billing", "invoice-close", 3, Utc::now());
        assert_eq!(job.identity(), ("billing", "invoice-close", 3));
        assert_eq!(job.command.as_code(), "Trigger");
    }
}
