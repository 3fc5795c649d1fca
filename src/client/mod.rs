//! 客户端
//!
//! - consumer - 增量解码线协议并维护界面状态
//! - session - 基于 reqwest 的会话（历史窗口、token）

pub mod consumer;
pub mod session;

pub use consumer::{ChatState, ClientEventConsumer, ConsumerUpdate, FinishedMessage, ToolActivity};
pub use session::{ChatClient, ClientError};
