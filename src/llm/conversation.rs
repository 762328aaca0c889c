use crate::error::DispatchError;
use crate::llm::types::{ChatMessage, Role, ToolCall};

/// Output of one handler invocation, bound to the call that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub content: String,
}

/// Append-only message history for a single interaction.
///
/// A tool call pushed with [`Conversation::push_tool_call`] leaves the
/// conversation unsettled until its result arrives; nothing else may be
/// appended in between.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    pending: Option<(String, String)>, // (call id, tool name)
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(system_prompt: impl Into<String>) -> Self {
        let mut c = Self::new();
        c.messages.push(ChatMessage::system(system_prompt));
        c
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Result<(), DispatchError> {
        self.ensure_settled("user message")?;
        self.messages.push(ChatMessage::user(content));
        Ok(())
    }

    pub fn push_assistant_text(&mut self, content: impl Into<String>) -> Result<(), DispatchError> {
        self.ensure_settled("assistant message")?;
        self.messages.push(ChatMessage::text(Role::Assistant, content));
        Ok(())
    }

    /// Append the assistant turn carrying `call`. The call must have an id.
    pub fn push_tool_call(&mut self, call: ToolCall) -> Result<(), DispatchError> {
        self.ensure_settled("tool call")?;
        let id = call.id.clone().ok_or_else(|| {
            DispatchError::ConversationOrder(format!("tool call {} has no id", call.name()))
        })?;
        self.pending = Some((id, call.name().to_string()));
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_calls: vec![call],
            tool_call_id: None,
            name: None,
        });
        Ok(())
    }

    /// Append the tool-role message answering the pending call.
    pub fn push_tool_result(&mut self, result: ToolResult) -> Result<(), DispatchError> {
        match &self.pending {
            Some((id, name)) if *id == result.call_id && *name == result.name => {}
            Some((id, name)) => {
                return Err(DispatchError::ConversationOrder(format!(
                    "result for {} ({}) does not answer pending call {} ({})",
                    result.name, result.call_id, name, id
                )));
            }
            None => {
                return Err(DispatchError::ConversationOrder(format!(
                    "result for {} without a pending call",
                    result.name
                )));
            }
        }
        self.pending = None;
        self.messages.push(ChatMessage {
            role: Role::Tool,
            content: Some(result.content),
            tool_calls: Vec::new(),
            tool_call_id: Some(result.call_id),
            name: Some(result.name),
        });
        Ok(())
    }

    /// True when every tool call has been answered.
    pub fn is_settled(&self) -> bool {
        self.pending.is_none()
    }

    pub fn ensure_settled(&self, what: &str) -> Result<(), DispatchError> {
        match &self.pending {
            None => Ok(()),
            Some((id, name)) => Err(DispatchError::ConversationOrder(format!(
                "{what} appended while tool call {name} ({id}) is unanswered"
            ))),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ToolCall {
        let mut c = ToolCall::new(name, json!({"city": "Paris"}));
        c.id = Some(id.to_string());
        c
    }

    fn result(id: &str, name: &str, content: &str) -> ToolResult {
        ToolResult {
            call_id: id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    #[test]
    fn preserves_insertion_order() {
        let mut c = Conversation::with_system("sys");
        c.push_user("hi").unwrap();
        c.push_tool_call(call("c1", "weather")).unwrap();
        c.push_tool_result(result("c1", "weather", "sunny")).unwrap();
        c.push_user("hi").unwrap();
        c.push_assistant_text("done").unwrap();

        let roles: Vec<Role> = c.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::Tool,
                Role::User,
                Role::Assistant
            ]
        );
        // identical user messages are kept, not deduplicated
        assert_eq!(c.len(), 6);
    }

    #[test]
    fn tool_result_references_the_call() {
        let mut c = Conversation::new();
        c.push_tool_call(call("c1", "weather")).unwrap();
        assert!(!c.is_settled());
        c.push_tool_result(result("c1", "weather", "sunny")).unwrap();
        assert!(c.is_settled());

        let tool_msg = &c.messages()[1];
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool_msg.name.as_deref(), Some("weather"));
        assert_eq!(tool_msg.content.as_deref(), Some("sunny"));
    }

    #[test]
    fn rejects_appends_while_call_is_pending() {
        let mut c = Conversation::new();
        c.push_tool_call(call("c1", "weather")).unwrap();
        assert!(matches!(
            c.push_user("again"),
            Err(DispatchError::ConversationOrder(_))
        ));
        assert!(matches!(
            c.push_tool_call(call("c2", "hotels")),
            Err(DispatchError::ConversationOrder(_))
        ));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn rejects_mismatched_or_orphan_results() {
        let mut c = Conversation::new();
        assert!(c.push_tool_result(result("c1", "weather", "x")).is_err());

        c.push_tool_call(call("c1", "weather")).unwrap();
        assert!(c.push_tool_result(result("c2", "weather", "x")).is_err());
        assert!(c.push_tool_result(result("c1", "hotels", "x")).is_err());
        assert!(!c.is_settled());
    }

    #[test]
    fn tool_call_without_id_is_rejected() {
        let mut c = Conversation::new();
        let err = c.push_tool_call(ToolCall::new("weather", json!({}))).unwrap_err();
        assert!(matches!(err, DispatchError::ConversationOrder(_)));
        assert!(c.is_settled());
    }
}
