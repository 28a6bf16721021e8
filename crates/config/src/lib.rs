pub mod models;

use config::{Config, Environment as EnvSource, File, FileFormat};
use courier_errors::{FrameworkError, FrameworkResult};

pub use models::*;

/// 分层加载配置：默认值 <- TOML 文件 <- COURIER__ 环境变量
///
/// 加载后的校验失败属于启动期致命错误，绝不推迟到首条消息。
pub fn load_config(path: Option<&str>) -> FrameworkResult<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(File::new(path, FileFormat::Toml).required(true));
    }

    let config = builder
        .add_source(EnvSource::with_prefix("COURIER").separator("__"))
        .build()
        .map_err(|e| FrameworkError::config_error(format!("加载配置失败: {e}")))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| FrameworkError::config_error(format!("解析配置失败: {e}")))?;

    app_config.validate()?;
    Ok(app_config)
}
