//! 原始事件 → 线协议事件
//!
//! 每次交换使用一个新的 [`StreamTranslator`]。状态只有两项：
//! 上一个原始事件的角色，以及当前轮次（从 0 开始）。
//!
//! # 轮次判定
//!
//! 当观察到 assistant 事件且紧邻的上一个原始事件是 user 角色（工具结果回灌）时，
//! 轮次加一并发出 `turn`。第一个 assistant 步骤不发 `turn`（第 0 轮是隐含的）。
//! 这是基于相邻事件角色的启发式：上游若连续给出多个 assistant 步骤而中间没有工具结果，
//! 轮次会少算。任何原始事件（包括未识别的）都会更新"上一个角色"。

use crate::agent::events::{ContentBlock, EventRole, RawAgentEvent, TerminalResult};
use crate::agent::invoker::{AgentError, AgentEventStream};
use crate::classifier::{user_message, UpstreamFailure};
use crate::logger::safe_truncate;
use crate::stream::wire::WireEvent;
use futures::{Stream, StreamExt};
use serde_json::Value;

/// 原始流在给出结果前结束时的错误消息
pub const PREMATURE_END_MESSAGE: &str = "agent stream ended before producing a result";

/// 用于生成工具调用摘要的输入字段（按优先级）
pub const TOOL_DETAIL_KEYS: &[&str] = &[
    "file_path",
    "path",
    "pattern",
    "command",
    "url",
    "query",
    "description",
];

/// 工具调用摘要最大长度（字符）
pub const MAX_TOOL_DETAIL_CHARS: usize = 120;

/// 流转换器
#[derive(Debug, Default)]
pub struct StreamTranslator {
    last_role: Option<EventRole>,
    current_turn: u32,
    /// 已输出终止事件，此后不再产出任何事件
    finished: bool,
}

impl StreamTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 转换一个原始事件
    pub fn translate(&mut self, event: &RawAgentEvent) -> Vec<WireEvent> {
        if self.finished {
            return Vec::new();
        }

        let previous = self.last_role.replace(event.role());
        let mut out = Vec::new();

        match event {
            RawAgentEvent::Assistant(step) => {
                if previous == Some(EventRole::User) {
                    self.current_turn += 1;
                    out.push(WireEvent::Turn {
                        turn: self.current_turn,
                    });
                }
                for block in &step.blocks {
                    match block {
                        ContentBlock::Text(text) if !text.is_empty() => {
                            out.push(WireEvent::text(text.clone()));
                        }
                        ContentBlock::ToolUse { id, name, input } => {
                            out.push(WireEvent::ToolUse {
                                tool: name.clone(),
                                id: id.clone(),
                                detail: tool_detail(input),
                            });
                        }
                        _ => {}
                    }
                }
            }
            RawAgentEvent::Result(result) => {
                self.finished = true;
                out.extend(translate_result(result));
            }
            RawAgentEvent::User | RawAgentEvent::System { .. } => {}
            RawAgentEvent::Unknown { kind } => {
                tracing::trace!("[TRANSLATOR] 忽略未识别事件: {:?}", kind);
            }
        }

        out
    }

    /// 原始流传输失败
    pub fn fail(&mut self, error: &AgentError) -> Vec<WireEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let message = user_message(UpstreamFailure::Exception(&error.to_string()));
        vec![WireEvent::error(message)]
    }

    /// 原始流结束
    ///
    /// 已经输出过结果时什么也不做；否则补一个错误事件。
    pub fn finish(&mut self) -> Vec<WireEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        vec![WireEvent::error(PREMATURE_END_MESSAGE)]
    }
}

fn translate_result(result: &TerminalResult) -> Vec<WireEvent> {
    let usage = WireEvent::Usage {
        data: result.usage_snapshot(),
    };

    let outcome = if result.is_success() {
        WireEvent::Result {
            content: result.result.clone().unwrap_or_default(),
        }
    } else {
        let detail = result.failure_detail();
        WireEvent::error(user_message(UpstreamFailure::ResultSubtype {
            subtype: result.failure_subtype(),
            detail: &detail,
        }))
    };

    vec![usage, outcome]
}

/// 从工具输入中提取一行摘要
pub fn tool_detail(input: &Value) -> Option<String> {
    TOOL_DETAIL_KEYS.iter().find_map(|key| {
        input
            .get(*key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| safe_truncate(v, MAX_TOOL_DETAIL_CHARS))
    })
}

/// 把原始事件流转换为线协议事件流
///
/// 每收到一个原始事件挂起一次；输出顺序与原始事件顺序一致。
/// 终止事件输出后立即关闭，不再读取原始流。
pub fn translate_stream(raw: AgentEventStream) -> impl Stream<Item = WireEvent> + Send + 'static {
    async_stream::stream! {
        let mut raw = raw;
        let mut translator = StreamTranslator::new();

        while let Some(item) = raw.next().await {
            let events = match item {
                Ok(event) => translator.translate(&event),
                Err(e) => {
                    tracing::warn!("[TRANSLATOR] 原始事件流失败: {}", e);
                    translator.fail(&e)
                }
            };
            for event in events {
                yield event;
            }
            if translator.is_finished() {
                return;
            }
        }

        for event in translator.finish() {
            tracing::warn!("[TRANSLATOR] 原始事件流在结果前结束");
            yield event;
        }
    }
}
