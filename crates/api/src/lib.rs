//! 拦截槽的HTTP管理面：开关、查询和清理，外加健康检查。

pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

pub use error::ApiError;
pub use response::ApiResponse;
pub use routes::{create_routes, AppState};
