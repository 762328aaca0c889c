use async_trait::async_trait;
use tracing::warn;

use crate::error::DispatchError;
use crate::llm::client_core::OpenAIClient;
use crate::llm::types::{ChatMessage, ChoiceMessage, ToolCall, ToolDef};

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    DirectAnswer(String),
    RequestedTool(ToolCall),
}

impl CompletionOutcome {
    /// Reduce a raw assistant message to an outcome. Only the first of
    /// several parallel tool calls is kept.
    pub fn from_message(msg: ChoiceMessage) -> Self {
        let mut calls = msg.requested_calls();
        if calls.is_empty() {
            return CompletionOutcome::DirectAnswer(msg.content.unwrap_or_default());
        }
        if calls.len() > 1 {
            let dropped: Vec<&str> = calls[1..].iter().map(|c| c.name()).collect();
            warn!(kept = %calls[0].name(), ?dropped, "model requested several tools; dispatching the first");
        }
        let mut call = calls.swap_remove(0);
        if call.id.is_none() {
            call.id = Some(format!("call_{}", uuid::Uuid::new_v4().simple()));
        }
        CompletionOutcome::RequestedTool(call)
    }
}

/// Anything that can turn a conversation plus advertised tools into the next step.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<CompletionOutcome, DispatchError>;
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<CompletionOutcome, DispatchError> {
        let msg = self.chat_tools_once(messages.to_vec(), tools).await?;
        Ok(CompletionOutcome::from_message(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Role;
    use serde_json::json;

    fn message(v: serde_json::Value) -> ChoiceMessage {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn text_only_is_direct_answer() {
        let outcome = CompletionOutcome::from_message(message(json!({
            "role": "assistant", "content": "X"
        })));
        assert_eq!(outcome, CompletionOutcome::DirectAnswer("X".into()));
    }

    #[test]
    fn null_content_without_calls_is_empty_answer() {
        let outcome = CompletionOutcome::from_message(message(json!({
            "role": "assistant", "content": null
        })));
        assert_eq!(outcome, CompletionOutcome::DirectAnswer(String::new()));
    }

    #[test]
    fn first_of_parallel_calls_is_kept() {
        let outcome = CompletionOutcome::from_message(message(json!({
            "role": "assistant",
            "tool_calls": [
                {"id": "a", "type": "function", "function": {"name": "first", "arguments": "{}"}},
                {"id": "b", "type": "function", "function": {"name": "second", "arguments": "{}"}}
            ]
        })));
        match outcome {
            CompletionOutcome::RequestedTool(call) => {
                assert_eq!(call.name(), "first");
                assert_eq!(call.id.as_deref(), Some("a"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn legacy_function_call_gets_generated_id() {
        let outcome = CompletionOutcome::from_message(ChoiceMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: Vec::new(),
            function_call: Some(crate::llm::types::FunctionCall {
                name: "search_exams".into(),
                arguments: r#"{"role":"developer"}"#.into(),
            }),
        });
        match outcome {
            CompletionOutcome::RequestedTool(call) => {
                assert_eq!(call.name(), "search_exams");
                assert!(call.id.unwrap().starts_with("call_"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
