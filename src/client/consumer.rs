//! 客户端事件消费
//!
//! 把中继返回的字节流增量解码成界面状态，流结束时组装出一条完整的助手消息。
//! 无法解析的行（包括未来版本新增的事件类型）一律静默跳过。

use crate::models::chat_model::ChatMessage;
use crate::stream::lines::LineSplitter;
use crate::stream::wire::{UsageSnapshot, WireEvent};
use std::time::{Duration, Instant};

/// 一次工具调用记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolActivity {
    pub tool: String,
    pub id: String,
    pub detail: Option<String>,
}

/// 累积的界面状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub content: String,
    pub tools: Vec<ToolActivity>,
    /// 本地统计的工具调用次数，以此为准
    pub tool_count: u32,
    pub turn: u32,
    pub usage: Option<UsageSnapshot>,
    received_text: bool,
    turn_since_text: bool,
}

/// 每个已应用事件对应的界面刷新
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerUpdate {
    /// 新增文本（可能带段落分隔）
    Text(String),
    Tool(ToolActivity),
    Turn(u32),
    Usage,
    /// 结果文本被用作兜底内容
    ResultFallback,
    /// 结果文本被忽略（已有内容）
    ResultIgnored,
    Error(String),
}

/// 流结束时组装的消息
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedMessage {
    pub message: ChatMessage,
    /// 已合并本地工具数和总耗时
    pub usage: Option<UsageSnapshot>,
    pub tool_count: u32,
    pub tools: Vec<ToolActivity>,
}

/// 客户端事件消费者
#[derive(Debug)]
pub struct ClientEventConsumer {
    splitter: LineSplitter,
    state: ChatState,
    started: Instant,
}

impl Default for ClientEventConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientEventConsumer {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    /// 以请求发出的时刻为起点计时，总耗时包含等待响应头的时间
    pub fn started_at(started: Instant) -> Self {
        Self {
            splitter: LineSplitter::new(),
            state: ChatState::default(),
            started,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// 输入一个字节块
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<ConsumerUpdate> {
        self.splitter
            .push(chunk)
            .iter()
            .filter_map(|line| self.apply_line(line))
            .collect()
    }

    /// 解析并应用一行；无法识别的行返回 None
    pub fn apply_line(&mut self, line: &str) -> Option<ConsumerUpdate> {
        match WireEvent::parse_line(line) {
            Some(event) => Some(self.apply(event)),
            None => {
                tracing::debug!("[CLIENT] 跳过无法解析的行: {}", crate::logger::preview(line, 80));
                None
            }
        }
    }

    /// 应用一个事件
    pub fn apply(&mut self, event: WireEvent) -> ConsumerUpdate {
        let state = &mut self.state;
        match event {
            WireEvent::Text { content } => {
                let mut delta = String::new();
                if state.turn_since_text
                    && !state.content.is_empty()
                    && !state.content.ends_with('\n')
                {
                    delta.push_str("\n\n");
                }
                delta.push_str(&content);
                state.content.push_str(&delta);
                state.received_text = true;
                state.turn_since_text = false;
                ConsumerUpdate::Text(delta)
            }
            WireEvent::ToolUse { tool, id, detail } => {
                let activity = ToolActivity { tool, id, detail };
                state.tool_count += 1;
                state.tools.push(activity.clone());
                ConsumerUpdate::Tool(activity)
            }
            WireEvent::Turn { turn } => {
                state.turn = turn;
                state.turn_since_text = true;
                ConsumerUpdate::Turn(turn)
            }
            WireEvent::Usage { data } => {
                state.usage = Some(data);
                ConsumerUpdate::Usage
            }
            WireEvent::Result { content } => {
                if !state.received_text && state.content.is_empty() && !content.is_empty() {
                    state.content = content;
                    ConsumerUpdate::ResultFallback
                } else {
                    ConsumerUpdate::ResultIgnored
                }
            }
            WireEvent::Error { content } => {
                state.content.push_str("\n\nError: ");
                state.content.push_str(&content);
                ConsumerUpdate::Error(content)
            }
        }
    }

    /// 应用缓冲中未以换行结束的最后一行
    pub fn flush(&mut self) -> Vec<ConsumerUpdate> {
        self.splitter
            .finish()
            .and_then(|line| self.apply_line(&line))
            .into_iter()
            .collect()
    }

    /// 流结束，使用自创建以来的耗时
    pub fn finish(self) -> (Vec<ConsumerUpdate>, Option<FinishedMessage>) {
        let elapsed = self.started.elapsed();
        self.finish_with_duration(elapsed)
    }

    /// 流结束，使用指定的总耗时
    pub fn finish_with_duration(
        mut self,
        total: Duration,
    ) -> (Vec<ConsumerUpdate>, Option<FinishedMessage>) {
        let updates = self.flush();

        let state = self.state;
        if state.content.is_empty() {
            return (updates, None);
        }

        let total_ms = u64::try_from(total.as_millis()).unwrap_or(u64::MAX);
        let usage = state
            .usage
            .map(|usage| usage.with_local_metrics(state.tool_count, total_ms));

        let finished = FinishedMessage {
            message: ChatMessage::assistant(state.content),
            usage,
            tool_count: state.tool_count,
            tools: state.tools,
        };
        (updates, Some(finished))
    }
}
