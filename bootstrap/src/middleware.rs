//! HTTP 中间件
//!
//! 与 gRPC 拦截器共用同一套请求 ID 约定：透传 `x-request-id`，
//! 缺失时生成，写入请求扩展并回写响应头，处理完成后记一条访问日志。
//!
//! # 示例
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/", get(index))
//!     .layer(axum::middleware::from_fn(request_id_middleware));
//! ```

use std::time::Instant;

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::debug;
use uuid::Uuid;

use crate::interceptor::{REQUEST_ID_KEY, RequestId};

/// 请求 ID 与访问日志中间件
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = match request
        .headers()
        .get(REQUEST_ID_KEY)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) => value.to_string(),
        None => Uuid::new_v4().to_string(),
    };
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let started = Instant::now();
    let mut response = next.run(request).await;
    debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "handled http request"
    );
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_KEY, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::{Router, middleware::from_fn, routing::get};
    use tower::util::ServiceExt;

    use super::*;

    // handler 回显扩展里的请求 ID
    fn app() -> Router {
        Router::new()
            .route(
                "/",
                get(|request: Request| async move {
                    match request.extensions().get::<RequestId>() {
                        Some(id) => id.0.clone(),
                        None => String::new(),
                    }
                }),
            )
            .layer(from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn test_propagates_incoming_request_id() {
        let request = HttpRequest::builder()
            .uri("/")
            .header(REQUEST_ID_KEY, "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.headers().get(REQUEST_ID_KEY).unwrap(), "abc-123");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"abc-123");
    }

    #[tokio::test]
    async fn test_mints_request_id_when_missing() {
        let request = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        let minted = response.headers().get(REQUEST_ID_KEY).unwrap();
        assert!(!minted.to_str().unwrap().is_empty());
    }
}
