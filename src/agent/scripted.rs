//! 脚本回放运行时
//!
//! 按顺序回放一组固定的原始事件，用于测试和本地演示。

use super::events::RawAgentEvent;
use super::invoker::{AgentError, AgentEventStream, AgentInvoker, AgentRequest};
use async_trait::async_trait;
use futures::stream;
use std::sync::{Arc, Mutex};

/// 脚本中的一步
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Event(RawAgentEvent),
    /// 在此处模拟传输失败
    Fail(String),
}

/// 回放固定事件序列的运行时
#[derive(Debug, Clone, Default)]
pub struct ScriptedInvoker {
    steps: Vec<ScriptStep>,
    /// 非空时 invoke 直接失败
    start_error: Option<String>,
    requests: Arc<Mutex<Vec<AgentRequest>>>,
}

impl ScriptedInvoker {
    pub fn new(events: Vec<RawAgentEvent>) -> Self {
        Self {
            steps: events.into_iter().map(ScriptStep::Event).collect(),
            ..Default::default()
        }
    }

    /// 从 stream-json 文本构建，非 JSON 行跳过
    pub fn from_lines(text: &str) -> Self {
        Self::new(text.lines().filter_map(RawAgentEvent::parse_line).collect())
    }

    pub fn with_steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// 调用本身就失败的运行时
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            start_error: Some(message.into()),
            ..Default::default()
        }
    }

    /// 已收到的请求
    pub fn requests(&self) -> Vec<AgentRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(&self, request: AgentRequest) -> Result<AgentEventStream, AgentError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }

        if let Some(message) = &self.start_error {
            return Err(AgentError::Spawn(message.clone()));
        }

        let items: Vec<Result<RawAgentEvent, AgentError>> = self
            .steps
            .iter()
            .map(|step| match step {
                ScriptStep::Event(event) => Ok(event.clone()),
                ScriptStep::Fail(message) => Err(AgentError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    message.clone(),
                ))),
            })
            .collect();

        Ok(Box::pin(stream::iter(items)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_replays_in_order_and_records_requests() {
        let invoker = ScriptedInvoker::from_lines(
            "{\"type\":\"system\",\"subtype\":\"init\"}\nnoise\n{\"type\":\"user\"}\n",
        );
        let stream = invoker
            .invoke(AgentRequest::new("hello"))
            .await
            .expect("invoke");
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Ok(RawAgentEvent::User)));
        assert_eq!(invoker.requests()[0].prompt, "hello");
    }

    #[tokio::test]
    async fn test_failing_invoker() {
        let invoker = ScriptedInvoker::failing("boom");
        assert!(matches!(
            invoker.invoke(AgentRequest::new("q")).await,
            Err(AgentError::Spawn(_))
        ));
    }
}
