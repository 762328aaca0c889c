mod client_core;
pub mod completion;
pub mod conversation;
mod embeddings;
pub mod images;
mod tool_execution;
pub mod types;

pub use client_core::*;
pub use completion::{CompletionClient, CompletionOutcome};
pub use conversation::{Conversation, ToolResult};
pub use tool_execution::*;
pub use types::*;
