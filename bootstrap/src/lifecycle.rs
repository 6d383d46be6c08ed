//! start 的等待阶段
//!
//! 后台 serve 任务至多通过单槽通道上报一个致命错误；等待方在这个
//! 通道与取消信号之间二选一。错误分支不会调用 stop，传输层已经死了。

use std::future::Future;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{BoxError, ServerError};
use crate::shutdown::ShutdownController;

pub(crate) async fn wait_for_exit<E, F>(
    error_slot: oneshot::Receiver<E>,
    shutdown: &ShutdownController,
    stop: F,
) -> Result<(), ServerError>
where
    E: Into<BoxError>,
    F: Future<Output = Result<(), ServerError>>,
{
    tokio::select! {
        received = error_slot => match received {
            Ok(err) => Err(ServerError::Runtime(err.into())),
            // 发送端随干净关闭一起销毁
            Err(_) => Ok(()),
        },
        _ = shutdown.cancelled() => {
            debug!("shutdown signal received");
            stop.await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_runtime_error_propagates_without_stopping() {
        let (error_tx, error_rx) = oneshot::channel::<std::io::Error>();
        let shutdown = ShutdownController::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let stop = {
            let stopped = stopped.clone();
            async move {
                stopped.store(true, Ordering::SeqCst);
                Ok(())
            }
        };
        error_tx
            .send(std::io::Error::other("accept loop died"))
            .unwrap();

        let result = wait_for_exit(error_rx, &shutdown, stop).await;
        assert!(matches!(result, Err(ServerError::Runtime(_))));
        assert!(!stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_clean_close_is_ok() {
        let (error_tx, error_rx) = oneshot::channel::<std::io::Error>();
        let shutdown = ShutdownController::new();
        drop(error_tx);
        let result = wait_for_exit(error_rx, &shutdown, async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_runs_stop() {
        let (_error_tx, error_rx) = oneshot::channel::<std::io::Error>();
        let shutdown = ShutdownController::new();
        shutdown.shutdown();
        let stopped = Arc::new(AtomicBool::new(false));
        let stop = {
            let stopped = stopped.clone();
            async move {
                stopped.store(true, Ordering::SeqCst);
                Ok(())
            }
        };

        let result = wait_for_exit(error_rx, &shutdown, stop).await;
        assert!(result.is_ok());
        assert!(stopped.load(Ordering::SeqCst));
    }
}
