//! Declarative action registry: each entry pairs a published schema with the
//! handler that runs once arguments have been validated against it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ActionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    String,
    Boolean,
}

impl ArgType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ArgType::String => value.is_string(),
            ArgType::Boolean => value.is_boolean(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            ArgType::String => "string",
            ArgType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    pub description: String,
    pub required: bool,
}

impl ArgSchema {
    pub fn required(name: &str, arg_type: ArgType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            arg_type,
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, arg_type: ArgType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, arg_type, description)
        }
    }
}

/// Published description of one action, in the shape agent runtimes consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSchema {
    pub name: String,
    pub description: String,
    pub args: Vec<ArgSchema>,
}

impl ActionSchema {
    pub fn new(name: &str, description: &str, args: Vec<ArgSchema>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            args,
        }
    }

    /// Check `args` against the schema. A `null` counts as missing; unknown
    /// extra arguments are ignored.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<ActionArgs, ActionError> {
        for arg in &self.args {
            match args.get(&arg.name) {
                None | Some(Value::Null) if arg.required => {
                    return Err(ActionError::MissingArgument {
                        action: self.name.clone(),
                        argument: arg.name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) if !arg.arg_type.accepts(value) => {
                    return Err(ActionError::InvalidArgument {
                        action: self.name.clone(),
                        argument: arg.name.clone(),
                        expected: arg.arg_type.label().to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(ActionArgs {
            action: self.name.clone(),
            values: args.clone(),
        })
    }
}

/// An invocation as received from an agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ActionCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Map::new(),
        }
    }

    pub fn arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.args.insert(name.to_string(), value.into());
        self
    }

    /// Parse a JSON-encoded argument object, as produced by function calling.
    pub fn from_json(name: &str, arguments: &str) -> Result<Self, ActionError> {
        let malformed = || ActionError::MalformedArguments {
            action: name.to_string(),
        };
        let value: Value = if arguments.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(arguments).map_err(|_| malformed())?
        };
        match value {
            Value::Object(args) => Ok(Self {
                name: name.to_string(),
                args,
            }),
            _ => Err(malformed()),
        }
    }
}

/// Arguments that passed schema validation.
#[derive(Debug, Clone)]
pub struct ActionArgs {
    action: String,
    values: Map<String, Value>,
}

impl ActionArgs {
    pub fn string(&self, name: &str) -> Result<&str, ActionError> {
        self.optional_string(name)
            .ok_or_else(|| ActionError::MissingArgument {
                action: self.action.clone(),
                argument: name.to_string(),
            })
    }

    pub fn optional_string(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }
}

/// What a handler did, reported back to the invoking agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied(String),
    /// The action was valid but the deck guard declined it.
    Refused(String),
}

impl ActionOutcome {
    pub fn message(&self) -> &str {
        match self {
            ActionOutcome::Applied(msg) | ActionOutcome::Refused(msg) => msg,
        }
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, args: ActionArgs) -> Result<ActionOutcome, ActionError>;
}

struct ActionEntry {
    schema: ActionSchema,
    handler: Arc<dyn ActionHandler>,
}

/// Ordered table of actions, looked up by name.
#[derive(Default)]
pub struct ActionRegistry {
    entries: Vec<ActionEntry>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action, replacing any earlier entry of the same name.
    pub fn register(&mut self, schema: ActionSchema, handler: Arc<dyn ActionHandler>) {
        self.entries.retain(|e| e.schema.name != schema.name);
        self.entries.push(ActionEntry { schema, handler });
    }

    pub fn schemas(&self) -> Vec<ActionSchema> {
        self.entries.iter().map(|e| e.schema.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate `call` against its schema, then run the handler.
    pub async fn dispatch(&self, call: &ActionCall) -> Result<ActionOutcome, ActionError> {
        let entry = self.entry(&call.name).ok_or_else(|| ActionError::UnknownAction {
            name: call.name.clone(),
        })?;
        let args = entry.schema.validate(&call.args)?;
        tracing::debug!(action = %call.name, "dispatching action");
        entry.handler.handle(args).await
    }

    fn entry(&self, name: &str) -> Option<&ActionEntry> {
        self.entries.iter().find(|e| e.schema.name == name)
    }
}
