//! Presentation copilot core: the slide deck, the editor overlay, narration
//! playback, and the action gateway through which agents drive them.

pub mod actions;
pub mod agent;
pub mod audio;
pub mod background;
pub mod deck;
pub mod editor;
pub mod error;
pub mod gateway;
pub mod narration;
pub mod openai_tools;
pub mod presenter;

pub use actions::{ActionCall, ActionOutcome, ActionSchema};
pub use agent::{AgentReport, AgentRuntime, ModelAgent, OfflineAgent};
pub use deck::{SharedDeck, SlideDeck};
pub use editor::{EditBuffer, EditorOverlay};
pub use error::{ErrorReporter, GatewayError, SlideError};
pub use gateway::{ActionGateway, EventSink};
pub use narration::{NarrationController, NarrationState};
pub use presenter::{ControlOutcome, Controls, DisabledReason, Presenter, SlideView};
