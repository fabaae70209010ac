//! Agent runtimes that discover and invoke gateway actions.
//!
//! A runtime receives one [`AgentTask`] per gateway operation: instructions,
//! the deck readables, and an [`ActionScope`] holding the only actions it may
//! call. Everything it dispatches runs under the task's token.

use async_trait::async_trait;
use serde_json::Value;
use slide_chatgpt::{ChatMessage, OpenAiModelClient};
use slide_common::{DeckSnapshot, SlideConfig};
use slide_protocol::TaskKind;

use crate::actions::{ActionCall, ActionOutcome};
use crate::error::AgentError;
use crate::gateway::{ActionScope, ADD_SLIDE, GENERATE_SPEECH};
use crate::openai_tools::{get_openai_tools, render_tools_instructions};

pub struct AgentTask<'a> {
    pub kind: TaskKind,
    pub instructions: String,
    /// Agent-readable descriptions of the deck.
    pub context: Vec<String>,
    pub deck: DeckSnapshot,
    pub scope: ActionScope<'a>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReport {
    /// Final text reply, if the agent produced one.
    pub message: Option<String>,
    /// Number of actions that were applied.
    pub actions: usize,
}

impl AgentReport {
    pub fn summary(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => format!("{} action(s) applied", self.actions),
        }
    }
}

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn run_task(&self, task: AgentTask<'_>) -> Result<AgentReport, AgentError>;
}

/// Chat model with function calling.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> anyhow::Result<ChatMessage>;
}

#[async_trait]
impl ChatModel for OpenAiModelClient {
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> anyhow::Result<ChatMessage> {
        OpenAiModelClient::complete(self, messages, tools).await
    }
}

/// Function-calling loop over a chat model. Tool results are fed back to the
/// model until it answers without calling any tool.
pub struct ModelAgent {
    model: Box<dyn ChatModel>,
    max_rounds: usize,
}

impl ModelAgent {
    pub fn new(model: Box<dyn ChatModel>, max_rounds: usize) -> Self {
        Self {
            model,
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn openai(api_key: String, model: String, max_rounds: usize) -> Self {
        Self::new(
            Box::new(OpenAiModelClient::new_with_model(api_key, model)),
            max_rounds,
        )
    }
}

#[async_trait]
impl AgentRuntime for ModelAgent {
    async fn run_task(&self, task: AgentTask<'_>) -> Result<AgentReport, AgentError> {
        let schemas = task.scope.tools();
        let tools = get_openai_tools(&schemas);
        let mut messages = vec![
            ChatMessage::system(render_tools_instructions(&task.context, &schemas)),
            ChatMessage::user(task.instructions.clone()),
        ];
        let mut applied = 0;

        for round in 0..self.max_rounds {
            let reply = self
                .model
                .complete(&messages, &tools)
                .await
                .map_err(AgentError::Request)?;
            if reply.tool_calls.is_empty() {
                let message = reply.content.filter(|text| !text.trim().is_empty());
                return Ok(AgentReport {
                    message,
                    actions: applied,
                });
            }

            tracing::debug!(task = %task.scope.task_id(), round, calls = reply.tool_calls.len(), "model requested tools");
            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in calls {
                let result = match ActionCall::from_json(&call.function.name, &call.function.arguments) {
                    Ok(action) => task.scope.dispatch(&action).await,
                    Err(err) => Err(err),
                };
                let content = match result {
                    Ok(outcome) => {
                        if matches!(outcome, ActionOutcome::Applied(_)) {
                            applied += 1;
                        }
                        outcome.message().to_string()
                    }
                    Err(err) => format!("Error: {err}"),
                };
                messages.push(ChatMessage::tool(call.id, content));
            }
        }
        Err(AgentError::TooManyRounds {
            rounds: self.max_rounds,
        })
    }
}

/// Deterministic agent used when no model is configured.
#[derive(Debug, Default, Clone)]
pub struct OfflineAgent;

impl OfflineAgent {
    fn headline(content: &str) -> String {
        content
            .lines()
            .map(|line| line.trim_start_matches('#').trim())
            .find(|line| !line.is_empty())
            .unwrap_or("our topic")
            .to_string()
    }

    fn speech(deck: &DeckSnapshot) -> Option<String> {
        let slide = deck.current()?;
        let notes = slide.notes.trim();
        let text = if notes.is_empty() {
            slide
                .content
                .lines()
                .map(|line| line.trim_start_matches(['#', '-', '*']).trim())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(". ")
        } else {
            notes.to_string()
        };
        (!text.is_empty()).then_some(text)
    }
}

#[async_trait]
impl AgentRuntime for OfflineAgent {
    async fn run_task(&self, task: AgentTask<'_>) -> Result<AgentReport, AgentError> {
        let call = match task.kind {
            TaskKind::GenerateSlide => {
                let headline = task
                    .deck
                    .current()
                    .map(|slide| Self::headline(&slide.content))
                    .unwrap_or_else(|| "our topic".to_string());
                ActionCall::new(ADD_SLIDE)
                    .arg("content", format!("# More on {headline}\n\n- Key idea\n- Example\n- Takeaway"))
                    .arg("backgroundQuery", headline.clone())
                    .arg("notes", format!("Expand on {headline} with an example."))
            }
            TaskKind::NarrateSlide => {
                let Some(text) = Self::speech(&task.deck) else {
                    return Ok(AgentReport {
                        message: Some("Nothing to narrate on this slide".to_string()),
                        actions: 0,
                    });
                };
                ActionCall::new(GENERATE_SPEECH).arg("text", text)
            }
            TaskKind::Chat | TaskKind::Direct => {
                return Err(AgentError::Unavailable {
                    reason: "no model configured; set OPENAI_API_KEY to chat".to_string(),
                });
            }
        };

        let outcome = task.scope.dispatch(&call).await.map_err(|err| AgentError::Protocol {
            reason: err.to_string(),
        })?;
        Ok(AgentReport {
            message: None,
            actions: usize::from(matches!(outcome, ActionOutcome::Applied(_))),
        })
    }
}

/// The model agent when an API key is configured, otherwise the offline agent.
pub fn agent_from_config(config: &SlideConfig) -> Box<dyn AgentRuntime> {
    match config.api_key.as_deref().filter(|key| !key.is_empty()) {
        Some(key) => {
            tracing::info!(model = %config.model, "using OpenAI agent");
            Box::new(ModelAgent::openai(
                key.to_string(),
                config.model.clone(),
                config.max_agent_rounds,
            ))
        }
        None => {
            tracing::info!("no API key configured; using offline agent");
            Box::new(OfflineAgent)
        }
    }
}
