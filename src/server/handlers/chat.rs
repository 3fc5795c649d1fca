//! 转发层聊天处理器
//!
//! 处理顺序：校验请求体（400）→ 限流（单行 error）→ 调用上游 → 管道转发。
//! 流打开以后的任何失败都以一行 `error` 事件结束响应。

use crate::classifier::{classify_transport, user_message, UpstreamFailure};
use crate::logger::preview;
use crate::models::chat_model::ChatRequest;
use crate::rate_limit::{identity_for_log, resolve_identity, retry_after_secs, RateLimitDecision};
use crate::server::response::{json_error, ndjson_response, single_error_response};
use crate::server::AppState;
use crate::stream::wire::WireEvent;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

/// 上游响应体
type UpstreamBody = std::pin::Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// POST /api/chat
pub async fn bridge_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4().simple().to_string();

    let request = match ChatRequest::parse(&body) {
        Ok(request) => request.with_history_window(state.config.history.max_messages()),
        Err(e) => {
            e.log_with_context(&request_id, "/api/chat");
            return json_error(&e);
        }
    };

    let identity = resolve_identity(&headers);
    if let RateLimitDecision::Denied { retry_after } = state.limiter.check(&identity) {
        let secs = retry_after_secs(retry_after);
        return single_error_response(
            StatusCode::OK,
            format!(
                "Rate limit exceeded. Please wait {} seconds before trying again.",
                secs
            ),
        );
    }

    info!(
        "[BRIDGE] request_id={} identity={} history={} repo={} prompt={}",
        request_id,
        identity_for_log(&identity),
        request.history.len(),
        preview(request.repo_url.as_deref().unwrap_or("(default)"), 120),
        preview(&request.prompt, 80)
    );

    let mut upstream = state
        .http
        .post(state.config.upstream_chat_url())
        .json(&request);
    if let Some(authorization) = headers.get(header::AUTHORIZATION) {
        upstream = upstream.header(header::AUTHORIZATION, authorization.clone());
    }

    let response = match upstream.send().await {
        Ok(response) => response,
        Err(e) => {
            let classified = classify_transport(&e);
            warn!(
                "[BRIDGE] request_id={} 上游调用失败: {} ({:?})",
                request_id, e, classified.category
            );
            return single_error_response(StatusCode::BAD_GATEWAY, classified.message);
        }
    };

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut upstream_body: UpstreamBody = Box::pin(response.bytes_stream());

    if status.is_success() {
        debug!("[BRIDGE] request_id={} 开始转发上游流", request_id);
        return ndjson_response(status, pipe_upstream(None, upstream_body, request_id));
    }

    // 非成功状态：有响应体则原样转发，否则按状态码合成一行错误
    match first_chunk(&mut upstream_body).await {
        Some(first) => {
            warn!(
                "[BRIDGE] request_id={} 上游返回 {}，转发响应体",
                request_id, status
            );
            ndjson_response(status, pipe_upstream(Some(first), upstream_body, request_id))
        }
        None => {
            warn!(
                "[BRIDGE] request_id={} 上游返回 {}，无响应体",
                request_id, status
            );
            single_error_response(
                status,
                user_message(UpstreamFailure::HttpStatus(status.as_u16())),
            )
        }
    }
}

/// 读取第一个非空块；读不到时返回 None
async fn first_chunk(body: &mut UpstreamBody) -> Option<Bytes> {
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) if bytes.is_empty() => continue,
            Ok(bytes) => return Some(bytes),
            Err(e) => {
                debug!("[BRIDGE] 读取上游错误响应体失败: {}", e);
                return None;
            }
        }
    }
    None
}

/// 原样转发上游字节
///
/// 读取失败时补一行分类后的 `error`；若中断在半行处，先补换行让半行自成一行。
/// 客户端断开时该流被丢弃，上游响应随之释放。
fn pipe_upstream(
    first: Option<Bytes>,
    body: UpstreamBody,
    request_id: String,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    async_stream::stream! {
        let mut body = body;
        let mut at_line_start = true;
        let mut total = 0usize;

        if let Some(first) = first {
            at_line_start = first.ends_with(b"\n");
            total += first.len();
            yield Ok(first);
        }

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    at_line_start = bytes.ends_with(b"\n");
                    total += bytes.len();
                    yield Ok(bytes);
                }
                Err(e) => {
                    let classified = classify_transport(&e);
                    warn!("[BRIDGE] request_id={} 上游流中断: {}", request_id, e);
                    let mut line = String::new();
                    if !at_line_start {
                        line.push('\n');
                    }
                    line.push_str(&WireEvent::error(classified.message).to_line());
                    yield Ok(Bytes::from(line));
                    return;
                }
            }
        }

        debug!("[BRIDGE] request_id={} 上游流结束，共 {} 字节", request_id, total);
    }
}
