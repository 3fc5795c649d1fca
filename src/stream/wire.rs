//! 线协议事件
//!
//! 中继对客户端保证的稳定协议：每行一个 JSON 对象，行与行之间互不依赖。
//!
//! ```text
//! {"type":"text","content":"..."}
//! {"type":"tool_use","tool":"Read","id":"toolu_1","detail":"src/main.rs"}
//! {"type":"turn","turn":1}
//! {"type":"usage","data":{...}}
//! {"type":"result","content":"..."}
//! {"type":"error","content":"..."}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// NDJSON 响应的 Content-Type
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// 线协议事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// 文本片段，按到达顺序转发，不合并
    Text { content: String },

    /// 工具调用
    ToolUse {
        tool: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// 轮次边界
    Turn { turn: u32 },

    /// 用量汇总
    Usage { data: UsageSnapshot },

    /// 最终结果文本
    Result { content: String },

    /// 错误（已转换为可读文本）
    Error { content: String },
}

impl WireEvent {
    pub fn text(content: impl Into<String>) -> Self {
        WireEvent::Text {
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        WireEvent::Error {
            content: content.into(),
        }
    }

    /// 事件类型名
    pub fn kind(&self) -> &'static str {
        match self {
            WireEvent::Text { .. } => "text",
            WireEvent::ToolUse { .. } => "tool_use",
            WireEvent::Turn { .. } => "turn",
            WireEvent::Usage { .. } => "usage",
            WireEvent::Result { .. } => "result",
            WireEvent::Error { .. } => "error",
        }
    }

    /// 编码为一行（含结尾换行）
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => {
                tracing::error!("[WIRE] 事件序列化失败: {}", e);
                "{\"type\":\"error\",\"content\":\"Failed to encode event\"}\n".to_string()
            }
        }
    }

    /// 解析一行；无法识别的行返回 None
    pub fn parse_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }
}

/// Token 用量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
}

/// 单个模型的用量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(rename = "costUSD", default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_search_requests: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
}

/// 一次交换的用量快照
///
/// 服务端给出成本、耗时、轮次与 token 明细；
/// `num_tools` 与 `total_duration_ms` 由客户端本地统计后合并。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_api_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(
        rename = "modelUsage",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub model_usage: BTreeMap<String, ModelUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_tools: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,
}

impl UsageSnapshot {
    /// 合并客户端本地统计
    pub fn with_local_metrics(mut self, num_tools: u32, total_duration_ms: u64) -> Self {
        self.num_tools = Some(num_tools);
        self.total_duration_ms = Some(total_duration_ms);
        self
    }
}
