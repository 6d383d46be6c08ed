//! 服务运行时

use kit_config::AppConfig;
use kit_telemetry::{init_tracing, init_tracing_json};
use tracing::info;

/// 初始化服务运行时
///
/// 生产环境输出 JSON 日志，其余环境输出人类可读格式
pub fn init_runtime(config: &AppConfig) {
    if config.is_production() {
        init_tracing_json(&config.telemetry.log_level);
    } else {
        init_tracing(&config.telemetry.log_level);
    }

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Runtime initialized"
    );
}
