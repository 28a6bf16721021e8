//! 测试共用工具：信封构造、测试处理器和端口mock。

pub mod builders;
pub mod handlers;
pub mod mocks;

pub use builders::{business_envelope, job_envelope, operator_claims};
pub use handlers::{AlwaysFailHandler, CountingHandler, FlakyHandler, RecordingHandler};
pub use mocks::{MockBroker, MockScheduleStore};
