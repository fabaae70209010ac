use serde_json::{json, Map, Value};

use crate::actions::ActionSchema;

/// Function-calling tool definition for one action.
pub fn to_openai_tool(schema: &ActionSchema) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for arg in &schema.args {
        properties.insert(
            arg.name.clone(),
            json!({
                "type": arg.arg_type,
                "description": arg.description,
            }),
        );
        if arg.required {
            required.push(Value::String(arg.name.clone()));
        }
    }
    json!({
        "type": "function",
        "function": {
            "name": schema.name,
            "description": schema.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        },
    })
}

pub fn get_openai_tools(schemas: &[ActionSchema]) -> Vec<Value> {
    schemas.iter().map(to_openai_tool).collect()
}

/// System prompt for a presentation task: the deck readables followed by the
/// actions the model may call.
pub fn render_tools_instructions(context: &[String], schemas: &[ActionSchema]) -> String {
    let mut lines: Vec<String> = vec![
        "You are a presentation copilot helping a speaker give a slide presentation.".to_string(),
    ];
    lines.extend(context.iter().cloned());
    if schemas.is_empty() {
        lines.push("No actions are available; answer in text only.".to_string());
    } else {
        lines.push("You can act on the presentation by calling these functions:".to_string());
        for schema in schemas {
            lines.push(format!("- {}: {}", schema.name, schema.description));
        }
    }
    lines.push("Keep slides concise. Reply briefly once you are done.".to_string());
    lines.join("\n")
}
