use axum::{
    body::{Body, to_bytes},
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::error;

/// 日志里最多保留的响应体字符数,超出只截断日志,不截断响应
const MAX_LOGGED_BODY_CHARS: usize = 2048;

fn body_excerpt(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .take(MAX_LOGGED_BODY_CHARS)
        .collect()
}

pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    if response.status().is_server_error() {
        let (mut parts, body) = response.into_parts();
        let bytes = match to_bytes(body, usize::MAX).await {
            Ok(b) => b,
            Err(e) => {
                error!("Failed to read error response body: {}", e);
                // body已丢失,长度头必须一并去掉
                parts.headers.remove(axum::http::header::CONTENT_LENGTH);
                return Response::from_parts(parts, Body::empty());
            }
        };

        error!(
            "Server error - {} {} - Status: {}, Body: {}",
            method,
            path,
            parts.status,
            body_excerpt(&bytes)
        );

        // body原样回填,头无需改动
        Response::from_parts(parts, Body::from(bytes))
    } else {
        response
    }
}
