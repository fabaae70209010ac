pub mod client;

pub use client::{ChatMessage, FunctionCall, OpenAiModelClient, ToolCall};
