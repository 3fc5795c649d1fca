//! 聊天会话
//!
//! 持有历史窗口和 bearer token，调用中继的 `/api/auth` 与 `/api/chat`，
//! 把响应字节流交给 [`ClientEventConsumer`]。

use super::consumer::{ChatState, ClientEventConsumer, ConsumerUpdate, FinishedMessage};
use crate::classifier::classify_transport;
use crate::models::chat_model::{trim_history, AuthRequest, AuthResponse, ChatMessage, ChatRequest};
use crate::stream::wire::WireEvent;
use futures::StreamExt;
use reqwest::StatusCode;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

/// 客户端错误
#[derive(Error, Debug)]
pub enum ClientError {
    /// 请求未能发出或响应无法读取
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// token 失效，需要重新认证
    #[error("unauthorized, please authenticate again")]
    Unauthorized,

    /// 认证被拒绝
    #[error("authentication failed: {0}")]
    AuthFailed(String),
}

/// 聊天会话
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    repo_url: Option<String>,
    history: Vec<ChatMessage>,
    max_history_messages: usize,
}

impl ChatClient {
    /// `base_url` 为中继根地址，例如 `http://127.0.0.1:8787`
    pub fn new(base_url: impl Into<String>, history_questions: usize) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, history_questions)
    }

    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        history_questions: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            repo_url: None,
            history: Vec::new(),
            max_history_messages: history_questions * 2,
        }
    }

    pub fn set_repo_url(&mut self, repo_url: Option<String>) {
        self.repo_url = repo_url;
    }

    pub fn repo_url(&self) -> Option<&str> {
        self.repo_url.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// 开始新对话
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// 用密码换取 token
    pub async fn authenticate(&mut self, password: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}/api/auth", self.base_url))
            .json(&AuthRequest {
                password: password.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        let body: AuthResponse = response.json().await?;
        if !body.success {
            let reason = body
                .error
                .unwrap_or_else(|| format!("status {}", status.as_u16()));
            return Err(ClientError::AuthFailed(reason));
        }
        self.token = body.token;
        Ok(())
    }

    /// 发送一个问题，边读边回调，返回组装好的助手消息
    ///
    /// 401 会清除 token 并返回 [`ClientError::Unauthorized`]，此时历史不变。
    pub async fn send<F>(
        &mut self,
        prompt: &str,
        mut on_update: F,
    ) -> Result<Option<FinishedMessage>, ClientError>
    where
        F: FnMut(&ConsumerUpdate, &ChatState),
    {
        let request = ChatRequest {
            prompt: prompt.to_string(),
            repo_url: self.repo_url.clone(),
            history: trim_history(&self.history, self.max_history_messages),
        };

        let mut builder = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let started = Instant::now();
        let response = builder.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("[CLIENT] token 已失效");
            self.token = None;
            return Err(ClientError::Unauthorized);
        }
        debug!("[CLIENT] 响应状态: {}", response.status());

        self.history.push(ChatMessage::user(prompt));

        let mut consumer = ClientEventConsumer::started_at(started);
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for update in consumer.push_chunk(&bytes) {
                        on_update(&update, consumer.state());
                    }
                }
                Err(e) => {
                    warn!("[CLIENT] 读取响应失败: {}", e);
                    let message = classify_transport(&e).message;
                    let update = consumer.apply(WireEvent::error(message));
                    on_update(&update, consumer.state());
                    break;
                }
            }
        }

        for update in consumer.flush() {
            on_update(&update, consumer.state());
        }
        let (_, finished) = consumer.finish();
        if let Some(finished) = &finished {
            self.history.push(finished.message.clone());
        }
        Ok(finished)
    }
}
