//! NDJSON 响应构建

use crate::error::RelayError;
use crate::stream::wire::{WireEvent, NDJSON_CONTENT_TYPE};
use axum::{
    body::{Body, Bytes},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{Stream, StreamExt};

/// 禁止中间层缓存的 Cache-Control
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// 以流式 NDJSON 响应返回字节流
pub fn ndjson_response<S>(status: StatusCode, body: S) -> Response
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, NO_CACHE)
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to build stream response"})),
            )
                .into_response()
        })
}

/// 把线协议事件流编码成 NDJSON 响应
pub fn wire_response<S>(status: StatusCode, events: S) -> Response
where
    S: Stream<Item = WireEvent> + Send + 'static,
{
    let body = events.map(|event| Ok::<Bytes, std::io::Error>(Bytes::from(event.to_line())));
    ndjson_response(status, body)
}

/// 只有一行 `error` 的响应
pub fn single_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let event = WireEvent::error(message);
    wire_response(status, futures::stream::iter([event]))
}

/// 聊天端点的 JSON 错误
pub fn json_error(err: &RelayError) -> Response {
    (status_of(err), Json(err.to_json())).into_response()
}

/// 认证端点的 JSON 错误
pub fn auth_json_error(err: &RelayError) -> Response {
    (status_of(err), Json(err.to_auth_json())).into_response()
}

fn status_of(err: &RelayError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
