pub mod critics;
pub mod envelope;
pub mod messaging;
pub mod scheduled_job;

pub use courier_errors::{FrameworkError, FrameworkResult};
pub use critics::*;
pub use envelope::*;
pub use messaging::*;
pub use scheduled_job::*;
