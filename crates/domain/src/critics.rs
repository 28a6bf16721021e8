use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::messaging::Localizer;

/// 业务批注类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CriticKind {
    Error,
    Warning,
    Info,
}

/// 单条业务批注（错误/警告/提示），创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Critic {
    pub code: String,
    pub message: String,
    pub kind: CriticKind,
}

impl Critic {
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M, kind: CriticKind) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind,
        }
    }
}

/// 逻辑操作的状态码
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StatusCode {
    #[default]
    Ok,
    BadRequest,
    NoContent,
    NotFound,
    Conflict,
    InternalError,
}

impl StatusCode {
    pub fn as_http_code(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::NoContent => 204,
            StatusCode::NotFound => 404,
            StatusCode::Conflict => 409,
            StatusCode::InternalError => 500,
        }
    }
}

/// 一次逻辑操作完成后的序列化结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainResponse {
    pub critics: Vec<Critic>,
    pub status_code: StatusCode,
}

impl DomainResponse {
    pub fn has_errors(&self) -> bool {
        self.critics.iter().any(|c| c.kind == CriticKind::Error)
    }
}

/// 业务结果聚合器
///
/// 每个逻辑操作（一条入站消息或一次API调用）持有一个独立实例，
/// 操作内单线程使用，操作结束后丢弃或序列化为 DomainResponse。
pub struct CriticHandler {
    critics: Vec<Critic>,
    status_code: StatusCode,
    localizer: Option<Arc<dyn Localizer>>,
}

impl CriticHandler {
    pub fn new(localizer: Arc<dyn Localizer>) -> Self {
        Self {
            critics: Vec::new(),
            status_code: StatusCode::Ok,
            localizer: Some(localizer),
        }
    }

    /// 不带消息目录的聚合器，消息退化为参数或代码本身
    pub fn detached() -> Self {
        Self {
            critics: Vec::new(),
            status_code: StatusCode::Ok,
            localizer: None,
        }
    }

    /// 采纳一个已计算完成的响应的批注列表（移动，不复制）
    pub fn from_response(response: DomainResponse) -> Self {
        Self {
            critics: response.critics,
            status_code: response.status_code,
            localizer: None,
        }
    }

    /// 消息解析：目录命中用本地化模板，未命中时退化为首个字符串参数，
    /// 再退化为代码本身，保证批注永远不会静默丢失
    fn resolve_message(&self, code: &str, args: &[&str]) -> String {
        if let Some(localizer) = &self.localizer {
            if let Some(message) = localizer.localize(code, args) {
                return message;
            }
        }
        args.first()
            .map(|s| s.to_string())
            .unwrap_or_else(|| code.to_string())
    }

    fn add(&mut self, code: &str, args: &[&str], kind: CriticKind) {
        let message = self.resolve_message(code, args);
        self.critics.push(Critic::new(code, message, kind));
    }

    pub fn add_error(&mut self, code: &str, args: &[&str]) {
        self.add(code, args, CriticKind::Error);
    }
    pub fn add_warning(&mut self, code: &str, args: &[&str]) {
        self.add(code, args, CriticKind::Warning);
    }
    pub fn add_info(&mut self, code: &str, args: &[&str]) {
        self.add(code, args, CriticKind::Info);
    }

    pub fn critics(&self) -> &[Critic] {
        &self.critics
    }
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }
    /// 状态码只由执行该操作的代码路径设置
    pub fn set_status(&mut self, status: StatusCode) {
        self.status_code = status;
    }

    pub fn has_business_errors(&self) -> bool {
        self.critics.iter().any(|c| c.kind == CriticKind::Error)
    }
    pub fn has_business_warnings(&self) -> bool {
        self.critics.iter().any(|c| c.kind == CriticKind::Warning)
    }
    pub fn has_business_info(&self) -> bool {
        self.critics.iter().any(|c| c.kind == CriticKind::Info)
    }

    pub fn has_critical_errors(&self) -> bool {
        self.has_business_errors() || self.status_code != StatusCode::Ok
    }

    /// 只允许 NoContent 回到 Ok，其它状态码不受影响；幂等
    pub fn reset_no_content_error(&mut self) {
        if self.status_code == StatusCode::NoContent {
            self.status_code = StatusCode::Ok;
        }
    }

    /// 只允许 Conflict 回到 Ok，其它状态码不受影响；幂等
    pub fn reset_conflict_error(&mut self) {
        if self.status_code == StatusCode::Conflict {
            self.status_code = StatusCode::Ok;
        }
    }

    /// 批注代码 -> 消息数组，外加命名状态对应的合成键（"400"/"204"/"409"）。
    /// 合成键只在相应状态被置位时追加，且不会替换逐条批注的条目。
    pub fn get_critical_errors(&self) -> HashMap<String, Vec<String>> {
        let mut errors: HashMap<String, Vec<String>> = HashMap::new();

        for critic in &self.critics {
            errors
                .entry(critic.code.clone())
                .or_default()
                .push(critic.message.clone());
        }

        let synthetic = match self.status_code {
            StatusCode::BadRequest => Some(("400", "Bad Request")),
            StatusCode::NoContent => Some(("204", "No Content")),
            StatusCode::Conflict => Some(("409", "Conflict")),
            _ => None,
        };
        if let Some((key, fallback)) = synthetic {
            let message = self.resolve_message(key, &[fallback]);
            errors.entry(key.to_string()).or_default().push(message);
        }

        errors
    }

    /// 结束操作：序列化为 DomainResponse 供请求/响应路径返回
    pub fn into_response(self) -> DomainResponse {
        DomainResponse {
            critics: self.critics,
            status_code: self.status_code,
        }
    }
}

impl std::fmt::Debug for CriticHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriticHandler")
            .field("critics", &self.critics)
            .field("status_code", &self.status_code)
            .finish()
    }
}
