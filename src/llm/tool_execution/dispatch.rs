use crate::error::DispatchError;
use crate::llm::conversation::ToolResult;
use crate::llm::types::ToolCall;
use crate::tools::{ToolArgs, ToolRegistry};
use tracing::debug;

/// Decode the JSON-string arguments of `call` into an argument map.
/// An empty string is read as no arguments.
pub fn parse_arguments(call: &ToolCall) -> Result<ToolArgs, DispatchError> {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return Ok(ToolArgs::new());
    }
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        DispatchError::MalformedResponse(format!(
            "arguments of {} are not valid JSON: {e}",
            call.name()
        ))
    })?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(DispatchError::MalformedResponse(format!(
            "arguments of {} must be a JSON object, got {other}",
            call.name()
        ))),
    }
}

pub async fn dispatch_tool_call(
    registry: &ToolRegistry,
    call: &ToolCall,
) -> Result<ToolResult, DispatchError> {
    debug!(tool = %call.name(), "dispatching tool call");
    if call.r#type != "function" {
        return Err(DispatchError::MalformedResponse(format!(
            "unsupported tool type: {}",
            call.r#type
        )));
    }
    let call_id = call.id.clone().ok_or_else(|| {
        DispatchError::MalformedResponse(format!("tool call {} has no id", call.name()))
    })?;
    let args = parse_arguments(call)?;
    let content = registry.invoke(call.name(), &args).await?;
    Ok(ToolResult {
        call_id,
        name: call.name().to_string(),
        content,
    })
}
