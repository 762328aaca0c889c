use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::DispatchError;
use crate::llm::types::{ToolDef, ToolFunctionDef};

pub type ToolArgs = JsonMap<String, JsonValue>;

/// A locally executable tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: &ToolArgs) -> anyhow::Result<String>;
}

#[async_trait]
impl<F> ToolHandler for F
where
    F: Fn(&ToolArgs) -> anyhow::Result<String> + Send + Sync,
{
    async fn call(&self, args: &ToolArgs) -> anyhow::Result<String> {
        self(args)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    fn accepts(self, value: &JsonValue) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

/// Advertised shape of a tool. Built once at startup and never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn required(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.param(name, kind, description, true)
    }

    pub fn optional(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.param(name, kind, description, false)
    }

    fn param(mut self, name: &str, kind: ParamType, description: &str, required: bool) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required,
        });
        self
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
    }

    /// Render as an OpenAI `tools[]` entry with a JSON Schema parameter object.
    pub fn to_tool_def(&self) -> ToolDef {
        let mut properties = JsonMap::new();
        for p in &self.params {
            properties.insert(
                p.name.clone(),
                json!({"type": p.kind, "description": p.description}),
            );
        }
        let required: Vec<&str> = self.required_fields().collect();
        ToolDef {
            kind: "function".into(),
            function: ToolFunctionDef {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }),
            },
        }
    }

    /// Every required field present and non-null; declared fields of the right type.
    pub fn validate(&self, args: &ToolArgs) -> Result<(), DispatchError> {
        let missing: Vec<&str> = self
            .required_fields()
            .filter(|f| args.get(*f).is_none_or(JsonValue::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(DispatchError::invalid_arguments(
                &self.name,
                format!("missing required field(s): {}", missing.join(", ")),
            ));
        }
        for p in &self.params {
            if let Some(v) = args.get(&p.name)
                && !v.is_null()
                && !p.kind.accepts(v)
            {
                return Err(DispatchError::invalid_arguments(
                    &self.name,
                    format!("field `{}` must be of type {:?}", p.name, p.kind),
                ));
            }
        }
        Ok(())
    }
}

struct RegisteredTool {
    schema: ToolSchema,
    handler: Arc<dyn ToolHandler>,
}

/// Static name → handler table consulted by the dispatcher.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    lookup: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        schema: ToolSchema,
        handler: impl ToolHandler + 'static,
    ) -> Result<(), DispatchError> {
        if self.lookup.contains_key(&schema.name) {
            return Err(DispatchError::DuplicateTool(schema.name));
        }
        self.lookup.insert(schema.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            schema,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    /// Schemas in registration order.
    pub fn describe(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    /// Wire form of [`describe`](Self::describe), in the same order.
    pub fn tool_defs(&self) -> Vec<ToolDef> {
        self.describe().iter().map(ToolSchema::to_tool_def).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.schema.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up `name`, validate `args` against its schema and run the handler.
    pub async fn invoke(&self, name: &str, args: &ToolArgs) -> Result<String, DispatchError> {
        let idx = *self
            .lookup
            .get(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        let tool = &self.tools[idx];
        tool.schema.validate(args)?;

        debug!(tool = %name, args = ?args, "invoking tool handler");
        tool.handler
            .call(args)
            .await
            .map_err(|e| DispatchError::transport(format!("tool {name}"), e))
    }
}
