//! 中继错误类型
//!
//! 定义 HTTP 层在建立流之前可能返回的错误

use thiserror::Error;

/// 中继错误
///
/// 只覆盖"流尚未打开"的失败；流打开之后的失败一律以 `error` 线事件的形式下发。
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// 请求体不是合法 JSON
    #[error("Invalid JSON body")]
    InvalidJson,

    /// 缺少 prompt 或 prompt 为空
    #[error("Missing or invalid 'prompt' field")]
    MissingPrompt,

    /// 缺少密码
    #[error("Missing password")]
    MissingPassword,

    /// Bearer token 校验失败
    #[error("Unauthorized")]
    Unauthorized,

    /// 密码错误
    #[error("Invalid password")]
    InvalidPassword,

    /// 认证上游不可用
    #[error("Authentication failed")]
    AuthUnavailable,
}

impl RelayError {
    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::InvalidJson => 400,
            RelayError::MissingPrompt => 400,
            RelayError::MissingPassword => 400,
            RelayError::Unauthorized => 401,
            RelayError::InvalidPassword => 401,
            RelayError::AuthUnavailable => 500,
        }
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::InvalidJson => "invalid_json",
            RelayError::MissingPrompt => "missing_prompt",
            RelayError::MissingPassword => "missing_password",
            RelayError::Unauthorized => "unauthorized",
            RelayError::InvalidPassword => "invalid_password",
            RelayError::AuthUnavailable => "auth_unavailable",
        }
    }

    /// 转换为 JSON 错误响应
    ///
    /// 聊天端点使用 `{"error": "..."}`，认证端点额外带 `success: false`。
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }

    /// 认证端点的 JSON 错误响应
    pub fn to_auth_json(&self) -> serde_json::Value {
        serde_json::json!({ "success": false, "error": self.to_string() })
    }

    /// 记录带上下文的错误日志
    pub fn log_with_context(&self, request_id: &str, route: &str) {
        tracing::warn!(
            request_id = %request_id,
            route = %route,
            error_type = %self.error_type(),
            error_message = %self.to_string(),
            "Request rejected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_status_codes() {
        assert_eq!(RelayError::InvalidJson.status_code(), 400);
        assert_eq!(RelayError::MissingPrompt.status_code(), 400);
        assert_eq!(RelayError::Unauthorized.status_code(), 401);
        assert_eq!(RelayError::AuthUnavailable.status_code(), 500);
        assert_eq!(RelayError::AuthUnavailable.error_type(), "auth_unavailable");
    }

    #[test]
    fn test_relay_error_to_json() {
        let json = RelayError::MissingPrompt.to_json();
        assert_eq!(json["error"], "Missing or invalid 'prompt' field");

        let json = RelayError::InvalidPassword.to_auth_json();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Invalid password");
    }
}
