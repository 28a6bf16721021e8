pub mod in_memory_broker;
pub mod interception;
pub mod job_store;
pub mod localizer;
pub mod rabbitmq;

pub use in_memory_broker::InMemoryBroker;
pub use interception::{InterceptedMessage, InterceptionSink};
pub use job_store::InMemoryJobStore;
pub use localizer::CatalogLocalizer;
pub use rabbitmq::RabbitMqBroker;
