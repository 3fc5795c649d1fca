//! Agent 运行时集成
//!
//! ## 架构设计
//! - events - 原始事件模型（开放变体，解析永不失败）
//! - invoker - 运行时接口与错误类型
//! - cli - 以子进程方式运行 Claude CLI
//! - scripted - 回放固定事件序列
//! - prompt - 把历史拼入提示词

pub mod cli;
pub mod events;
pub mod invoker;
pub mod prompt;
pub mod scripted;

pub use cli::ClaudeCliInvoker;
pub use events::{AssistantStep, ContentBlock, EventRole, RawAgentEvent, TerminalResult};
pub use invoker::{AgentError, AgentEventStream, AgentInvoker, AgentRequest};
pub use prompt::build_prompt;
pub use scripted::{ScriptStep, ScriptedInvoker};
