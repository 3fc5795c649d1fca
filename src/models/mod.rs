//! 数据模型

pub mod chat_model;

pub use chat_model::{trim_history, AuthRequest, AuthResponse, ChatMessage, ChatRequest, Role};
