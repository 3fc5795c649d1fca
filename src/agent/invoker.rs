//! Agent 调用接口
//!
//! 中继只依赖"提交 prompt 与选项，拿到一个有序的原始事件异步序列"这一契约，
//! 具体运行时（CLI 子进程、脚本回放）通过 [`AgentInvoker`] 注入。

use super::events::RawAgentEvent;
use crate::models::chat_model::ChatMessage;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// 原始事件流
///
/// 流中的 `Err` 表示传输失败，消费方应当在第一个错误后停止读取。
pub type AgentEventStream = BoxStream<'static, Result<RawAgentEvent, AgentError>>;

/// Agent 调用错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 无法启动 agent 进程
    #[error("failed to start agent process: {0}")]
    Spawn(String),

    /// agent 进程异常退出且没有给出结果
    #[error("agent process exited with {status}: {stderr}")]
    Process { status: String, stderr: String },

    /// 读取 agent 输出失败
    #[error("failed to read agent output: {0}")]
    Io(#[from] std::io::Error),

    /// 准备仓库检出失败
    #[error("failed to prepare repository checkout: {0}")]
    Checkout(String),

    /// 请求参数不合法
    #[error("invalid agent request: {0}")]
    InvalidRequest(String),
}

/// 一次 agent 调用的输入
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRequest {
    pub prompt: String,
    pub repo_url: Option<String>,
    /// 已裁剪的历史
    pub history: Vec<ChatMessage>,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            repo_url: None,
            history: Vec::new(),
        }
    }
}

/// Agent 运行时
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// 提交一次请求，返回原始事件流
    ///
    /// 返回 `Err` 表示调用本身没能开始（进程无法启动、检出失败等）。
    async fn invoke(&self, request: AgentRequest) -> Result<AgentEventStream, AgentError>;

    /// 运行时名称，用于日志
    fn name(&self) -> &str;
}
