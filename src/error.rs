use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the tool dispatch loop and the clients it drives.
///
/// None of these are recovered internally; every one aborts the interaction.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for tool {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("transport failure ({context}): {source}")]
    Transport {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    #[error("conversation order violated: {0}")]
    ConversationOrder(String),

    #[error("model kept requesting tools after {0} tool round(s)")]
    MaxToolRoundsExceeded(usize),
}

impl DispatchError {
    pub fn transport(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        DispatchError::Transport {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        DispatchError::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}
