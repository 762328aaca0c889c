use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::llm::completion::{CompletionClient, CompletionOutcome};
use crate::llm::conversation::Conversation;
use crate::llm::types::{ToolCall, ToolDef};
use crate::tools::ToolRegistry;

use super::dispatch::dispatch_tool_call;

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchState {
    AwaitingCompletion,
    ExecutingTool(ToolCall),
}

/// Drives one interaction: completion, optional tool execution, completion again,
/// until the model answers directly or the tool round bound is hit.
pub struct Dispatcher<'a> {
    client: &'a dyn CompletionClient,
    registry: &'a ToolRegistry,
    max_tool_rounds: usize,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        client: &'a dyn CompletionClient,
        registry: &'a ToolRegistry,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            client,
            registry,
            max_tool_rounds,
        }
    }

    /// Run the loop on `conversation`, which is extended in place.
    /// Any error aborts the interaction; nothing is retried.
    pub async fn run(&self, conversation: &mut Conversation) -> Result<String, DispatchError> {
        let tools = self.registry.tool_defs();
        let mut rounds = 0usize;
        let mut state = DispatchState::AwaitingCompletion;

        loop {
            state = match state {
                DispatchState::AwaitingCompletion => {
                    conversation.ensure_settled("completion request")?;
                    // Once the bound is spent the model is offered no tools.
                    let offered: &[ToolDef] = if rounds < self.max_tool_rounds {
                        &tools
                    } else {
                        &[]
                    };
                    debug!(
                        messages = conversation.len(),
                        rounds,
                        tools = offered.len(),
                        "requesting completion"
                    );
                    match self.client.complete(conversation.messages(), offered).await? {
                        CompletionOutcome::DirectAnswer(text) => {
                            conversation.push_assistant_text(text.clone())?;
                            info!(rounds, "interaction finished");
                            return Ok(text);
                        }
                        CompletionOutcome::RequestedTool(call) => {
                            if rounds >= self.max_tool_rounds {
                                warn!(tool = %call.name(), rounds, "tool round limit reached");
                                return Err(DispatchError::MaxToolRoundsExceeded(rounds));
                            }
                            DispatchState::ExecutingTool(call)
                        }
                    }
                }
                DispatchState::ExecutingTool(call) => {
                    rounds += 1;
                    info!(tool = %call.name(), round = rounds, "executing tool");
                    conversation.push_tool_call(call.clone())?;
                    let result = dispatch_tool_call(self.registry, &call).await?;
                    debug!(tool = %result.name, len = result.content.len(), "tool finished");
                    conversation.push_tool_result(result)?;
                    DispatchState::AwaitingCompletion
                }
            };
        }
    }
}
