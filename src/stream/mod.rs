//! 流式处理层
//!
//! ```text
//! agent 原始事件流 ──> [StreamTranslator] ──> WireEvent ──> NDJSON 行 ──> 客户端
//!                                                              │
//!                                              [LineSplitter] <┘
//! ```
//!
//! # 模块结构
//!
//! - `wire`: 对客户端的稳定事件协议
//! - `translator`: 原始事件到线协议的状态机与异步管道
//! - `lines`: 字节流的跨块行切分

pub mod lines;
pub mod translator;
pub mod wire;

pub use lines::LineSplitter;
pub use translator::{translate_stream, StreamTranslator, PREMATURE_END_MESSAGE};
pub use wire::{ModelUsage, TokenUsage, UsageSnapshot, WireEvent, NDJSON_CONTENT_TYPE};
