//! 分发层：端点绑定注册表、并发门控分发器、发送路径和作业调度分发。

pub mod dispatcher;
pub mod registry;
pub mod scheduler;
pub mod sender;

pub use dispatcher::{DispatchOutcome, DispatcherEngine};
pub use registry::{
    rewrite_channel_name, BindingRegistry, BindingRegistryBuilder, EndpointBinding,
    EndpointDeclaration,
};
pub use scheduler::JobDispatcher;
pub use sender::MessageSender;
