//! Agent 原始事件
//!
//! agent 运行时以 `stream-json` 逐行输出消息，格式由上游定义且会演进。
//! 这里把它建模为开放的标签变体：解析永不失败，任何字段都当作可选、不可信，
//! 不认识的标签落入 [`RawAgentEvent::Unknown`]，由调用方忽略。

use crate::stream::wire::{ModelUsage, TokenUsage, UsageSnapshot};
use serde_json::Value;
use std::collections::BTreeMap;

/// 原始事件的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRole {
    /// 助手产出内容的一步
    Assistant,
    /// 用户角色消息（工具结果回灌）
    User,
    /// 其他事件
    Other,
}

/// 助手消息中的内容块
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// thinking 等其他块
    Other(Option<String>),
}

/// 助手的一步
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssistantStep {
    pub model: Option<String>,
    pub blocks: Vec<ContentBlock>,
}

/// 终止结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TerminalResult {
    pub subtype: Option<String>,
    pub is_error: bool,
    pub result: Option<String>,
    pub errors: Vec<String>,
    pub total_cost_usd: Option<f64>,
    pub duration_ms: Option<u64>,
    pub duration_api_ms: Option<u64>,
    pub num_turns: Option<u32>,
    pub usage: Option<TokenUsage>,
    pub model_usage: BTreeMap<String, ModelUsage>,
}

impl TerminalResult {
    /// 是否成功
    ///
    /// `is_error` 为真一定失败；有子类型时只有 `success` 算成功。
    pub fn is_success(&self) -> bool {
        !self.is_error
            && self
                .subtype
                .as_deref()
                .map_or(true, |subtype| subtype == "success")
    }

    /// 失败子类型，缺失时给出通用值
    pub fn failure_subtype(&self) -> &str {
        match self.subtype.as_deref() {
            Some(subtype) if subtype != "success" => subtype,
            _ => "error_during_execution",
        }
    }

    /// 失败细节：优先 result 文本，其次 errors 列表
    pub fn failure_detail(&self) -> String {
        match self.result.as_deref() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => self.errors.join("; "),
        }
    }

    pub fn usage_snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            total_cost_usd: self.total_cost_usd,
            duration_ms: self.duration_ms,
            duration_api_ms: self.duration_api_ms,
            num_turns: self.num_turns,
            usage: self.usage.clone(),
            model_usage: self.model_usage.clone(),
            num_tools: None,
            total_duration_ms: None,
        }
    }
}

/// Agent 原始事件
#[derive(Debug, Clone, PartialEq)]
pub enum RawAgentEvent {
    Assistant(AssistantStep),
    User,
    Result(TerminalResult),
    System { subtype: Option<String> },
    Unknown { kind: Option<String> },
}

impl RawAgentEvent {
    /// 从一行 JSON 解析；不是 JSON 的行返回 None
    pub fn parse_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str::<Value>(trimmed)
            .ok()
            .map(Self::from_value)
    }

    /// 从 JSON 值解析，总是成功
    pub fn from_value(value: Value) -> Self {
        let kind = str_field(&value, "type");
        match kind.as_deref() {
            Some("assistant") => RawAgentEvent::Assistant(parse_assistant(&value)),
            Some("user") => RawAgentEvent::User,
            Some("result") => RawAgentEvent::Result(parse_result(&value)),
            Some("system") => RawAgentEvent::System {
                subtype: str_field(&value, "subtype"),
            },
            _ => RawAgentEvent::Unknown { kind },
        }
    }

    pub fn role(&self) -> EventRole {
        match self {
            RawAgentEvent::Assistant(_) => EventRole::Assistant,
            RawAgentEvent::User => EventRole::User,
            _ => EventRole::Other,
        }
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn parse_assistant(value: &Value) -> AssistantStep {
    let message = value.get("message");
    let model = message.and_then(|m| str_field(m, "model"));
    let blocks = message
        .and_then(|m| m.get("content"))
        .map(|content| match content {
            // 少数版本直接给字符串
            Value::String(text) => vec![ContentBlock::Text(text.clone())],
            Value::Array(items) => items.iter().map(parse_block).collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default();

    AssistantStep { model, blocks }
}

fn parse_block(block: &Value) -> ContentBlock {
    match block.get("type").and_then(|t| t.as_str()) {
        Some("text") => match block.get("text").and_then(|t| t.as_str()) {
            Some(text) => ContentBlock::Text(text.to_string()),
            None => ContentBlock::Other(Some("text".to_string())),
        },
        Some("tool_use") => ContentBlock::ToolUse {
            id: str_field(block, "id").unwrap_or_default(),
            name: str_field(block, "name").unwrap_or_else(|| "unknown".to_string()),
            input: block.get("input").cloned().unwrap_or(Value::Null),
        },
        other => ContentBlock::Other(other.map(|s| s.to_string())),
    }
}

fn parse_result(value: &Value) -> TerminalResult {
    let errors = value
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| match item.as_str() {
                    Some(s) => s.to_string(),
                    None => item.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let model_usage = value
        .get("modelUsage")
        .and_then(|m| m.as_object())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(model, usage)| {
                    serde_json::from_value::<ModelUsage>(usage.clone())
                        .ok()
                        .map(|u| (model.clone(), u))
                })
                .collect()
        })
        .unwrap_or_default();

    TerminalResult {
        subtype: str_field(value, "subtype"),
        is_error: value
            .get("is_error")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        result: str_field(value, "result"),
        errors,
        total_cost_usd: value.get("total_cost_usd").and_then(|v| v.as_f64()),
        duration_ms: value.get("duration_ms").and_then(|v| v.as_u64()),
        duration_api_ms: value.get("duration_api_ms").and_then(|v| v.as_u64()),
        num_turns: value
            .get("num_turns")
            .and_then(|v| v.as_u64())
            .map(|n| n.min(u32::MAX as u64) as u32),
        usage: value
            .get("usage")
            .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok()),
        model_usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_assistant_blocks() {
        let event = RawAgentEvent::from_value(json!({
            "type": "assistant",
            "message": {
                "model": "claude-sonnet-4-5",
                "content": [
                    {"type": "text", "text": "Looking"},
                    {"type": "tool_use", "id": "toolu_1", "name": "Read", "input": {"file_path": "src/main.rs"}},
                    {"type": "thinking", "thinking": "..."}
                ]
            }
        }));
        let RawAgentEvent::Assistant(step) = event else {
            panic!("应解析为 assistant");
        };
        assert_eq!(step.model.as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(step.blocks.len(), 3);
        assert_eq!(step.blocks[0], ContentBlock::Text("Looking".to_string()));
        assert!(matches!(step.blocks[1], ContentBlock::ToolUse { ref name, .. } if name == "Read"));
        assert_eq!(step.blocks[2], ContentBlock::Other(Some("thinking".to_string())));
    }

    #[test]
    fn test_parse_result() {
        let event = RawAgentEvent::from_value(json!({
            "type": "result",
            "subtype": "success",
            "is_error": false,
            "result": "It is a relay.",
            "total_cost_usd": 0.0123,
            "duration_ms": 4200,
            "num_turns": 3,
            "usage": {"input_tokens": 100, "output_tokens": 20, "server_tool_use": {}},
            "modelUsage": {"claude-sonnet-4-5": {"inputTokens": 100, "costUSD": 0.0123}}
        }));
        let RawAgentEvent::Result(result) = event else {
            panic!("应解析为 result");
        };
        assert!(result.is_success());
        let usage = result.usage_snapshot();
        assert_eq!(usage.total_cost_usd, Some(0.0123));
        assert_eq!(usage.num_turns, Some(3));
        assert_eq!(usage.usage.unwrap().input_tokens, Some(100));
        assert_eq!(
            usage.model_usage["claude-sonnet-4-5"].cost_usd,
            Some(0.0123)
        );
    }

    #[test]
    fn test_result_failure_detection() {
        let failed = TerminalResult {
            subtype: Some("error_max_turns".to_string()),
            ..Default::default()
        };
        assert!(!failed.is_success());
        assert_eq!(failed.failure_subtype(), "error_max_turns");

        let flagged = TerminalResult {
            subtype: Some("success".to_string()),
            is_error: true,
            result: Some("API Error: 500".to_string()),
            ..Default::default()
        };
        assert!(!flagged.is_success());
        assert_eq!(flagged.failure_subtype(), "error_during_execution");
        assert_eq!(flagged.failure_detail(), "API Error: 500");

        let with_errors = TerminalResult {
            subtype: Some("error_during_execution".to_string()),
            errors: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        assert_eq!(with_errors.failure_detail(), "a; b");
    }

    #[test]
    fn test_unknown_and_malformed() {
        assert_eq!(
            RawAgentEvent::from_value(json!({"type": "stream_event", "event": {}})),
            RawAgentEvent::Unknown {
                kind: Some("stream_event".to_string())
            }
        );
        assert_eq!(
            RawAgentEvent::from_value(json!([1, 2, 3])),
            RawAgentEvent::Unknown { kind: None }
        );
        assert!(RawAgentEvent::parse_line("not json").is_none());
        assert!(RawAgentEvent::parse_line("   ").is_none());
        assert_eq!(
            RawAgentEvent::parse_line(r#"{"type":"user","message":{"role":"user"}}"#),
            Some(RawAgentEvent::User)
        );
    }

    #[test]
    fn test_assistant_without_message_is_empty_step() {
        let event = RawAgentEvent::from_value(json!({"type": "assistant"}));
        assert_eq!(event, RawAgentEvent::Assistant(AssistantStep::default()));
        assert_eq!(event.role(), EventRole::Assistant);
    }
}
