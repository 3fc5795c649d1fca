//! agent 层聊天处理器

use crate::agent::AgentRequest;
use crate::classifier::{user_message, UpstreamFailure};
use crate::logger::preview;
use crate::models::chat_model::ChatRequest;
use crate::server::response::{json_error, single_error_response, wire_response};
use crate::server::AppState;
use crate::stream::translator::translate_stream;
use crate::stream::wire::WireEvent;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use futures::StreamExt;
use std::time::Instant;
use tracing::{info, warn};

/// POST /agent/chat
pub async fn agent_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4().simple().to_string();

    let request = match ChatRequest::parse(&body) {
        Ok(request) => request.with_history_window(state.config.history.max_messages()),
        Err(e) => {
            e.log_with_context(&request_id, "/agent/chat");
            return json_error(&e);
        }
    };

    if let Err(e) = state.auth.verify_headers(&headers) {
        e.log_with_context(&request_id, "/agent/chat");
        return json_error(&e);
    }

    info!(
        "[AGENT] request_id={} invoker={} history={} prompt={}",
        request_id,
        state.invoker.name(),
        request.history.len(),
        preview(&request.prompt, 80)
    );

    let agent_request = AgentRequest {
        prompt: request.prompt,
        repo_url: request.repo_url,
        history: request.history,
    };

    let raw = match state.invoker.invoke(agent_request).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("[AGENT] request_id={} 调用失败: {}", request_id, e);
            let message = user_message(UpstreamFailure::Exception(&e.to_string()));
            return single_error_response(StatusCode::INTERNAL_SERVER_ERROR, message);
        }
    };

    let started = Instant::now();
    let mut emitted = 0usize;
    let events = translate_stream(raw).inspect(move |event| {
        emitted += 1;
        match event {
            WireEvent::Result { .. } | WireEvent::Error { .. } => {
                info!(
                    "[AGENT] request_id={} 交换结束: {} events, {}ms, outcome={}",
                    request_id,
                    emitted,
                    started.elapsed().as_millis(),
                    event.kind()
                );
            }
            _ => {}
        }
    });

    wire_response(StatusCode::OK, events)
}
