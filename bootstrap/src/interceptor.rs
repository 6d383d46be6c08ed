//! gRPC Interceptors

use tonic::{Request, Status};
use tracing::debug;
use uuid::Uuid;

/// 请求 ID 的 metadata key
pub const REQUEST_ID_KEY: &str = "x-request-id";

/// 请求 ID，可从请求扩展中取出
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// 请求 ID 拦截器
///
/// 透传上游的 `x-request-id`，缺失时生成新的，写入请求扩展
#[allow(clippy::result_large_err)]
pub fn request_id_interceptor(mut request: Request<()>) -> Result<Request<()>, Status> {
    let request_id = match request
        .metadata()
        .get(REQUEST_ID_KEY)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) => value.to_string(),
        None => Uuid::new_v4().to_string(),
    };
    debug!(request_id = %request_id, "handling gRPC request");
    request.extensions_mut().insert(RequestId(request_id));
    Ok(request)
}

/// 从请求扩展中获取请求 ID
pub fn request_id<T>(request: &Request<T>) -> Option<&str> {
    request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.as_str())
}
