mod agent_loop;
mod dispatch;

pub use agent_loop::{DispatchState, Dispatcher};
pub use dispatch::{dispatch_tool_call, parse_arguments};
