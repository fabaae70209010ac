use slide_protocol::TaskKind;
use thiserror::Error;

/// Core error types for the presentation engine
#[derive(Error, Debug)]
pub enum SlideError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Narration error: {0}")]
    Narration(#[from] NarrationError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Rejections of a single action invocation. None of these mutate the deck.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Unknown action: {name}")]
    UnknownAction { name: String },

    #[error("Action {action} is missing required argument '{argument}'")]
    MissingArgument { action: String, argument: String },

    #[error("Action {action} argument '{argument}' must be a {expected}")]
    InvalidArgument {
        action: String,
        argument: String,
        expected: String,
    },

    #[error("Action {action} arguments are not a JSON object")]
    MalformedArguments { action: String },

    #[error("Action {action} failed: {reason}")]
    Failed { action: String, reason: String },
}

impl ActionError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ActionError::MissingArgument { .. }
                | ActionError::InvalidArgument { .. }
                | ActionError::MalformedArguments { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Another agent task is running: {active}")]
    Busy { active: TaskKind },

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Narration(#[from] NarrationError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NarrationError {
    #[error("Narration already playing")]
    AlreadyPlaying,

    #[error("Narration interrupted by reset")]
    Interrupted,

    #[error("Narration stalled after {timeout_secs}s without playback ending")]
    Stalled { timeout_secs: u64 },

    #[error("Playback device error: {reason}")]
    Device { reason: String },
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent runtime unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Agent request failed: {0}")]
    Request(#[source] anyhow::Error),

    #[error("Agent exceeded {rounds} tool rounds")]
    TooManyRounds { rounds: usize },

    #[error("Agent produced unusable output: {reason}")]
    Protocol { reason: String },
}

/// Error reporting utilities
pub struct ErrorReporter;

impl ErrorReporter {
    /// Format error for user display
    pub fn format_user_error(error: &SlideError) -> String {
        match error {
            SlideError::Gateway(err) => Self::format_gateway_error(err),
            SlideError::Action(err) => format!("⚙️  {err}"),
            SlideError::Narration(err) => Self::format_narration_error(err),
            SlideError::Agent(err) => format!("🤖 {err}"),
            SlideError::Generic(err) => format!("Unexpected error: {err}"),
        }
    }

    pub fn format_gateway_error(error: &GatewayError) -> String {
        match error {
            GatewayError::Busy { active } => {
                format!("⏳ Busy with {active}\n💡 Wait for it to finish")
            }
            GatewayError::Action(err) => format!("⚙️  {err}"),
            GatewayError::Agent(err) => format!("🤖 {err}"),
            GatewayError::Narration(err) => Self::format_narration_error(err),
        }
    }

    fn format_narration_error(error: &NarrationError) -> String {
        match error {
            NarrationError::Stalled { timeout_secs } => format!(
                "🔇 Narration stalled after {timeout_secs}s\n💡 Check the speech endpoint and player"
            ),
            _ => format!("🔊 {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_classified() {
        let missing = ActionError::MissingArgument {
            action: "addSlide".to_string(),
            argument: "notes".to_string(),
        };
        assert!(missing.is_validation());
        assert!(!ActionError::UnknownAction {
            name: "x".to_string()
        }
        .is_validation());
        assert_eq!(
            missing.to_string(),
            "Action addSlide is missing required argument 'notes'"
        );
    }

    #[test]
    fn busy_is_reported_with_task_kind() {
        let err = SlideError::from(GatewayError::Busy {
            active: TaskKind::NarrateSlide,
        });
        assert!(ErrorReporter::format_user_error(&err).contains("narration"));
    }
}
