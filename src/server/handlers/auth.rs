//! 认证处理器

use crate::error::RelayError;
use crate::models::chat_model::{AuthRequest, AuthResponse};
use crate::server::response::auth_json_error;
use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

/// POST /api/auth
///
/// 转发给上游 `/auth`，原样返回 JSON 与状态码。
pub async fn bridge_auth(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match AuthRequest::parse(&body) {
        Ok(request) => request,
        Err(e) => return auth_json_error(&e),
    };

    let response = match state
        .http
        .post(state.config.upstream_auth_url())
        .json(&request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!("[BRIDGE] 认证上游调用失败: {}", e);
            return auth_json_error(&RelayError::AuthUnavailable);
        }
    };

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    match response.json::<serde_json::Value>().await {
        Ok(body) => (status, Json(body)).into_response(),
        Err(e) => {
            warn!("[BRIDGE] 认证上游响应无法解析: {}", e);
            auth_json_error(&RelayError::AuthUnavailable)
        }
    }
}

/// POST /agent/auth
pub async fn agent_auth(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match AuthRequest::parse(&body) {
        Ok(request) => request,
        Err(e) => return auth_json_error(&e),
    };

    match state.auth.login(&request.password) {
        Ok(token) => {
            info!("[AUTH] 认证成功");
            Json(AuthResponse {
                success: true,
                token,
                error: None,
            })
            .into_response()
        }
        Err(e) => {
            warn!("[AUTH] 密码错误");
            auth_json_error(&e)
        }
    }
}
