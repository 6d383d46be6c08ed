//! gRPC 服务生命周期管理
//!
//! 与 HTTP 变体共享同一套状态机，另外维护一张服务名注册表：
//! start 时先把所有已注册服务标记为 SERVING，再开始 accept。
//! 标准的 `grpc.health.v1.Health` 服务由 tonic-health 提供。
//!
//! # 示例
//!
//! ```ignore
//! let srv = GrpcServer::new()
//!     .with_addr("0.0.0.0:5000")
//!     .add_service(ContentManagerServer::new(manager));
//! let shutdown = ShutdownController::new();
//! shutdown.on_os_signals();
//! srv.start(&shutdown).await?;
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::server::NamedService;
use tonic::service::RoutesBuilder;
use tonic::transport::Server;
use tonic_health::ServingStatus;
use tracing::debug;

use crate::error::ServerError;
use crate::lifecycle::wait_for_exit;
use crate::shutdown::ShutdownController;

struct ServeTask {
    handle: JoinHandle<()>,
    stop: CancellationToken,
}

/// 管理单个 gRPC 服务实例的生命周期
pub struct GrpcServer {
    addr: String,
    routes: RoutesBuilder,
    // 注册表只在 start 前追加，serve 开始后不再变化
    service_names: Vec<&'static str>,
    stop_timeout: Duration,
    running: Arc<AtomicBool>,
    local_addr: StdMutex<Option<SocketAddr>>,
    serving: Mutex<Option<ServeTask>>,
}

impl GrpcServer {
    pub fn new() -> Self {
        Self {
            addr: "0.0.0.0:5000".to_string(),
            routes: RoutesBuilder::default(),
            service_names: Vec::new(),
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

    /// 覆盖停机排空时长
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// 注册一个服务，服务名记入健康检查注册表
    pub fn add_service<S>(mut self, service: S) -> Self
    where
        S: tonic::codegen::Service<
                ::http::Request<tonic::body::Body>,
                Response = ::http::Response<tonic::body::Body>,
                Error = std::convert::Infallible,
            > + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.service_names.push(S::NAME);
        self.routes.add_service(service);
        self
    }

    /// 已注册的服务名
    pub fn service_names(&self) -> &[&'static str] {
        &self.service_names
    }

    /// serve 循环是否在运行
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// bind 成功后的实际监听地址
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 启动服务并阻塞，直到出现运行时错误或收到取消信号
    ///
    /// 顺序保证：bind < running=true < 健康状态标记 < accept 循环。
    /// 健康检查永远不会观察到已注册但未标记的服务。
    pub async fn start(&self, shutdown: &ShutdownController) -> Result<(), ServerError> {
        let error_slot = {
            let mut serving = self.serving.lock().await;
            if serving.is_some() {
                return Err(ServerError::AlreadyRunning);
            }
            debug!(listen = %self.addr, "opening net listener");
            let listener = TcpListener::bind(self.addr.as_str())
                .await
                .map_err(ServerError::Bind)?;
            let local_addr = listener.local_addr().map_err(ServerError::Bind)?;
            *self
                .local_addr
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(local_addr);
            self.running.store(true, Ordering::SeqCst);

            let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
            for name in &self.service_names {
                health_reporter
                    .set_service_status(name, ServingStatus::Serving)
                    .await;
            }

            let stop = CancellationToken::new();
            let (error_tx, error_rx) = oneshot::channel::<tonic::transport::Error>();
            debug!(addr = %local_addr, "starting gRPC server");

            let router = Server::builder()
                .add_routes(self.routes.clone().routes())
                .add_service(health_service);
            let incoming = TcpListenerStream::new(listener);
            let running = self.running.clone();
            let graceful = stop.clone();
            let handle = tokio::spawn(async move {
                let result = router
                    .serve_with_incoming_shutdown(incoming, graceful.cancelled_owned())
                    .await;
                running.store(false, Ordering::SeqCst);
                match result {
                    Ok(()) => debug!("gRPC server closed"),
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
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut serving = self.serving.lock().await;
        let Some(task) = serving.take() else {
            return Ok(());
        };
        debug!("gracefully stopping gRPC server");
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

impl Default for GrpcServer {
    fn default() -> Self {
        Self::new()
    }
}
