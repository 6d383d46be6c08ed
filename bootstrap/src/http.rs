//! HTTP 服务生命周期管理
//!
//! `start` 同步 bind 后把阻塞的 serve 循环放进唯一的后台任务，
//! 调用方在运行时错误与取消信号之间二选一等待；`stop` 在
//! `stop_timeout` 内排空连接，超时强制关闭。
//!
//! # 示例
//!
//! ```ignore
//! let srv = HttpServer::new().with_addr("0.0.0.0:8080");
//! let shutdown = ShutdownController::new();
//! shutdown.on_os_signals();
//! if let Err(err) = srv.start(&shutdown).await {
//!     // bind 或运行时错误
//! }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ServerError;
use crate::lifecycle::wait_for_exit;
use crate::shutdown::ShutdownController;

/// 健康检查端点配置
#[derive(Debug, Clone)]
pub struct HealthOptions {
    pub app: String,
    pub version: String,
    /// 挂载路径。`None` 时仅在没有业务 handler 的情况下占用 `/`
    pub path: Option<String>,
}

impl Default for HealthOptions {
    fn default() -> Self {
        Self {
            app: "kit".to_string(),
            version: String::new(),
            path: None,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    app: String,
    version: String,
    serving: bool,
}

#[derive(Clone)]
struct HealthState {
    app: String,
    version: String,
    running: Arc<AtomicBool>,
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let serving = state.running.load(Ordering::SeqCst);
    let status = if serving {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            app: state.app,
            version: state.version,
            serving,
        }),
    )
}

struct ServeTask {
    handle: JoinHandle<()>,
    stop: CancellationToken,
}

/// 管理单个 HTTP 服务实例的生命周期
pub struct HttpServer {
    addr: String,
    handler: Option<Router>,
    health: HealthOptions,
    stop_timeout: Duration,
    running: Arc<AtomicBool>,
    local_addr: StdMutex<Option<SocketAddr>>,
    serving: Mutex<Option<ServeTask>>,
}

impl HttpServer {
    pub fn new() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
            handler: None,
            health: HealthOptions::default(),
            stop_timeout: Duration::from_secs(10),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: StdMutex::new(None),
            serving: Mutex::new(None),
        }
    }

    /// 覆盖监听地址
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// 覆盖业务 handler
    pub fn with_handler(mut self, handler: Router) -> Self {
        self.handler = Some(handler);
        self
    }

    /// 覆盖健康检查配置
    pub fn with_health(mut self, health: HealthOptions) -> Self {
        self.health = health;
        self
    }

    /// 覆盖停机排空时长
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// serve 循环是否在运行
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// bind 成功后的实际监听地址（`:0` 时有用）
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn router(&self) -> Router {
        let state = HealthState {
            app: self.health.app.clone(),
            version: self.health.version.clone(),
            running: self.running.clone(),
        };
        match (&self.handler, &self.health.path) {
            (None, _) => Router::new().route("/", get(health_handler).with_state(state)),
            (Some(handler), Some(path)) => handler
                .clone()
                .route(path, get(health_handler).with_state(state)),
            (Some(handler), None) => handler.clone(),
        }
    }

    /// 启动服务并阻塞，直到出现运行时错误或收到取消信号
    ///
    /// bind 失败同步返回 `ServerError::Bind`，不会启动后台任务。
    /// 收到取消信号时调用 `stop` 并返回其结果。
    pub async fn start(&self, shutdown: &ShutdownController) -> Result<(), ServerError> {
        let error_slot = {
            let mut serving = self.serving.lock().await;
            if serving.is_some() {
                return Err(ServerError::AlreadyRunning);
            }
            let listener = TcpListener::bind(self.addr.as_str())
                .await
                .map_err(ServerError::Bind)?;
            let local_addr = listener.local_addr().map_err(ServerError::Bind)?;
            *self
                .local_addr
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(local_addr);

            let app = self.router();
            let stop = CancellationToken::new();
            // 单槽错误通道：至多一个致命错误从 serve 循环传出
            let (error_tx, error_rx) = oneshot::channel::<std::io::Error>();
            self.running.store(true, Ordering::SeqCst);
            debug!(addr = %local_addr, "http server listening");

            let running = self.running.clone();
            let graceful = stop.clone();
            let handle = tokio::spawn(async move {
                let result = axum::serve(listener, app)
                    .with_graceful_shutdown(graceful.cancelled_owned())
                    .await;
                running.store(false, Ordering::SeqCst);
                match result {
                    Ok(()) => debug!("http server closed"),
                    Err(err) => {
                        let _ = error_tx.send(err);
                    }
                }
            });
            *serving = Some(ServeTask { handle, stop });
            error_rx
        };

        let result = wait_for_exit(error_slot, shutdown, self.stop()).await;
        if matches!(result, Err(ServerError::Runtime(_))) {
            // 传输层已死，清掉槽位即可，不再尝试停机
            self.serving.lock().await.take();
        }
        result
    }

    /// 优雅停止服务，最多等待 `stop_timeout`
    ///
    /// 服务已停止时直接返回 `Ok`，不会阻塞
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut serving = self.serving.lock().await;
        let Some(task) = serving.take() else {
            return Ok(());
        };
        debug!("gracefully stopping http server");
        task.stop.cancel();
        let mut handle = task.handle;
        let result = tokio::time::timeout(self.stop_timeout, &mut handle).await;
        self.running.store(false, Ordering::SeqCst);
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => Err(ServerError::Shutdown(join_err.into())),
            Err(_elapsed) => {
                handle.abort();
                Err(ServerError::ShutdownTimeout {
                    timeout: self.stop_timeout,
                })
            }
        }
    }
}

impl Default for HttpServer {
    fn default() -> Self {
        Self::new()
    }
}
