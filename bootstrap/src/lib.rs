//! kit-bootstrap - 统一服务启动骨架
//!
//! HTTP/gRPC 服务共用的生命周期管理：同步 bind、后台 serve、
//! 运行时错误与取消信号二选一、有界优雅停机

mod error;
pub mod grpc;
pub mod http;
mod interceptor;
mod lifecycle;
mod middleware;
mod runtime;
mod shutdown;

pub use error::*;
pub use grpc::GrpcServer;
pub use http::{HealthOptions, HttpServer};
pub use interceptor::*;
pub use middleware::*;
pub use runtime::*;
pub use shutdown::*;
