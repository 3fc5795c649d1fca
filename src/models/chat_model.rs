//! 聊天请求与认证请求模型

use crate::error::RelayError;
use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 对话消息，创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 只保留最近 `max_messages` 条消息
pub fn trim_history(history: &[ChatMessage], max_messages: usize) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(max_messages);
    history[start..].to_vec()
}

/// 聊天请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(rename = "repoUrl", default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            repo_url: None,
            history: Vec::new(),
        }
    }

    /// 解析并校验请求体
    ///
    /// 请求体必须是 JSON，且 `prompt` 为非空字符串。
    /// `history` 中格式不对的条目直接丢弃，不影响整个请求。
    pub fn parse(body: &[u8]) -> Result<Self, RelayError> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| RelayError::InvalidJson)?;

        let prompt = value
            .get("prompt")
            .and_then(|v| v.as_str())
            .filter(|p| !p.trim().is_empty())
            .ok_or(RelayError::MissingPrompt)?
            .to_string();

        let repo_url = value
            .get("repoUrl")
            .and_then(|v| v.as_str())
            .filter(|u| !u.trim().is_empty())
            .map(|u| u.to_string());

        let history = value
            .get("history")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value::<ChatMessage>(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            prompt,
            repo_url,
            history,
        })
    }

    /// 裁剪历史窗口
    pub fn with_history_window(mut self, max_messages: usize) -> Self {
        self.history = trim_history(&self.history, max_messages);
        self
    }
}

/// 认证请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub password: String,
}

impl AuthRequest {
    pub fn parse(body: &[u8]) -> Result<Self, RelayError> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| RelayError::InvalidJson)?;
        let password = value
            .get("password")
            .and_then(|v| v.as_str())
            .filter(|p| !p.is_empty())
            .ok_or(RelayError::MissingPassword)?;
        Ok(Self {
            password: password.to_string(),
        })
    }
}

/// 认证响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_request() {
        let body = br#"{"prompt":"What does this repo do?","repoUrl":"https://github.com/a/b","history":[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]}"#;
        let request = ChatRequest::parse(body).unwrap();
        assert_eq!(request.prompt, "What does this repo do?");
        assert_eq!(request.repo_url.as_deref(), Some("https://github.com/a/b"));
        assert_eq!(request.history.len(), 2);
        assert_eq!(request.history[1].role, Role::Assistant);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            ChatRequest::parse(b"not json"),
            Err(RelayError::InvalidJson)
        ));
        assert!(matches!(
            ChatRequest::parse(br#"{"prompt":"   "}"#),
            Err(RelayError::MissingPrompt)
        ));
        assert!(matches!(
            ChatRequest::parse(br#"{"prompt":42}"#),
            Err(RelayError::MissingPrompt)
        ));
        assert!(matches!(
            ChatRequest::parse(br#"{}"#),
            Err(RelayError::MissingPrompt)
        ));
    }

    #[test]
    fn test_parse_drops_malformed_history_entries() {
        let body = br#"{"prompt":"q","history":[{"role":"system","content":"x"},{"role":"user","content":"ok"},7]}"#;
        let request = ChatRequest::parse(body).unwrap();
        assert_eq!(request.history, vec![ChatMessage::user("ok")]);
    }

    #[test]
    fn test_trim_history_keeps_most_recent() {
        let history: Vec<ChatMessage> = (0..20)
            .map(|i| ChatMessage::user(format!("m{}", i)))
            .collect();
        let trimmed = trim_history(&history, 16);
        assert_eq!(trimmed.len(), 16);
        assert_eq!(trimmed[0].content, "m4");
        assert_eq!(trim_history(&history[..3], 16).len(), 3);
        assert!(trim_history(&history, 0).is_empty());
    }

    #[test]
    fn test_serialize_omits_empty_fields() {
        let json = serde_json::to_value(ChatRequest::new("q")).unwrap();
        assert_eq!(json, serde_json::json!({"prompt": "q"}));
    }

    #[test]
    fn test_auth_request_parse() {
        assert_eq!(
            AuthRequest::parse(br#"{"password":"pw"}"#).unwrap().password,
            "pw"
        );
        assert!(matches!(
            AuthRequest::parse(br#"{"password":""}"#),
            Err(RelayError::MissingPassword)
        ));
    }
}
