//! Graceful Shutdown
//!
//! 可注入的一次性取消源。进程信号只是其中一种触发方式，
//! 测试里直接调用 `shutdown()` 即可，不需要发真实信号。

use tokio_util::sync::CancellationToken;
use tracing::info;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Shutdown 控制器
///
/// 取消是粘性的：先 `shutdown()` 后 `cancelled()` 也会立即完成。
/// 重复触发没有额外效果。
#[derive(Clone)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// 触发关闭
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("triggering shutdown");
            self.token.cancel();
        }
    }

    /// 等待关闭信号
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// 是否已触发
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 把默认信号集（TERM/QUIT/INT）接到控制器上
    pub fn on_os_signals(&self) {
        let controller = self.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            controller.shutdown();
        });
    }

    /// 把指定信号集接到控制器上
    #[cfg(unix)]
    pub fn on_signals(&self, kinds: Vec<SignalKind>) {
        let controller = self.clone();
        tokio::spawn(async move {
            shutdown_signal_for(&kinds).await;
            controller.shutdown();
        });
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待默认关闭信号集中的第一个信号
pub async fn shutdown_signal() {
    #[cfg(unix)]
    shutdown_signal_for(&[
        SignalKind::terminate(),
        SignalKind::quit(),
        SignalKind::interrupt(),
    ])
    .await;

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    }
}

/// 等待指定信号集中的第一个信号
#[cfg(unix)]
pub async fn shutdown_signal_for(kinds: &[SignalKind]) {
    let mut streams: Vec<Signal> = kinds
        .iter()
        .map(|kind| signal(*kind).expect("Failed to install signal handler"))
        .collect();
    std::future::poll_fn(|cx| {
        use std::task::Poll;
        for stream in streams.iter_mut() {
            if stream.poll_recv(cx).is_ready() {
                return Poll::Ready(());
            }
        }
        Poll::Pending
    })
    .await;
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_is_sticky() {
        let controller = ShutdownController::new();
        controller.shutdown();
        // 晚到的等待者也能观察到取消
        controller.cancelled().await;
        assert!(controller.is_shutdown());
    }

    #[tokio::test]
    async fn test_repeat_shutdown_is_noop() {
        let controller = ShutdownController::new();
        controller.shutdown();
        controller.shutdown();
        assert!(controller.is_shutdown());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let controller = ShutdownController::new();
        let other = controller.clone();
        controller.shutdown();
        other.cancelled().await;
        assert!(other.is_shutdown());
    }
}
