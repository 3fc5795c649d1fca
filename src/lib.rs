//! chat-relay
//!
//! 流式聊天中继：限流、调用会使用工具的 agent、把它松散的原始事件流
//! 转换成稳定的行分隔事件协议，并不经缓冲地推送给客户端。
//!
//! ```text
//! 客户端 ──> 转发层 (校验/限流) ──> agent 层 (AgentInvoker → StreamTranslator)
//!   ^                                                     │
//!   └──────── ClientEventConsumer <──── NDJSON 管道 <──────┘
//! ```

pub mod agent;
pub mod auth;
pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod stream;

pub use config::RelayConfig;
pub use error::RelayError;
pub use server::{build_router, run_server, AppState};
