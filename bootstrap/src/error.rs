//! 服务生命周期错误
//!
//! 三类错误都是该 server 实例的终态，这里不做重试，
//! 重试策略属于进程 supervisor

use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ServerError {
    /// 监听器无法打开。同步返回，后台任务未启动
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    /// serve 循环报告的非关闭错误。传输层已死，不会再尝试停机
    #[error("server runtime error: {0}")]
    Runtime(#[source] BoxError),

    /// 同一实例重复 start
    #[error("server already started")]
    AlreadyRunning,

    /// 停机阶段 serve 任务异常退出
    #[error("server task failed during shutdown: {0}")]
    Shutdown(#[source] BoxError),

    /// 在 stop_timeout 内未完成排空，连接已被强制关闭
    #[error("graceful shutdown did not complete within {timeout:?}")]
    ShutdownTimeout { timeout: Duration },
}
