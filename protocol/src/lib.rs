use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of agent-directed task occupying the single flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A single action invoked directly by the agent runtime.
    Direct,
    GenerateSlide,
    NarrateSlide,
    Chat,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskKind::Direct => "action",
            TaskKind::GenerateSlide => "slide generation",
            TaskKind::NarrateSlide => "narration",
            TaskKind::Chat => "chat",
        };
        f.write_str(label)
    }
}

/// Notifications emitted by the action gateway for the view layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TaskStarted { id: String, kind: TaskKind },
    TaskComplete { id: String, kind: TaskKind },
    TaskFailed { id: String, kind: TaskKind, message: String },
    ActionApplied { name: String, message: String },
    ActionRejected { name: String, reason: String },
    NarrationStarted { text: String },
    NarrationFinished,
    AgentMessage { message: String },
}
