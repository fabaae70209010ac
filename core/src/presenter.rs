//! User-facing facade: the buttons of the presentation view.
//!
//! Every mutating control takes a short-lived task token from the gateway's
//! single flight, so a control pressed while an agent task runs is reported
//! as disabled instead of racing the agent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::Url;
use slide_common::{Slide, SlideConfig};
use slide_protocol::TaskKind;

use crate::actions::{ActionCall, ActionOutcome, ActionSchema};
use crate::agent::{agent_from_config, AgentReport, AgentRuntime};
use crate::audio::CommandPlayer;
use crate::background::background_url;
use crate::deck::{self, SharedDeck, SlideDeck};
use crate::editor::{EditBuffer, EditorOverlay};
use crate::error::{GatewayError, NarrationError};
use crate::gateway::{ActionGateway, EventSink, TaskToken};
use crate::narration::{DeviceFactory, NarrationController, NarrationSettings, NarrationState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisabledReason {
    Busy(TaskKind),
    SingleSlide,
    AtStart,
    AtEnd,
    EditorHidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    Disabled(DisabledReason),
}

impl ControlOutcome {
    pub fn is_applied(self) -> bool {
        self == ControlOutcome::Applied
    }
}

/// Enabled flag of every control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Controls {
    pub add: bool,
    pub generate: bool,
    pub delete: bool,
    pub narrate: bool,
    pub edit: bool,
    pub previous: bool,
    pub next: bool,
    pub chat: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlideView {
    pub index: usize,
    pub len: usize,
    pub slide: Slide,
    pub background: Option<Url>,
    /// Buffer of the editor overlay, when visible.
    pub editor: Option<EditBuffer>,
    pub narration: NarrationState,
    pub busy: Option<TaskKind>,
    pub controls: Controls,
}

pub struct Presenter {
    deck: SharedDeck,
    editor: Mutex<EditorOverlay>,
    gateway: ActionGateway,
    agent: Box<dyn AgentRuntime>,
    background_endpoint: String,
}

impl Presenter {
    pub fn new(
        deck: SlideDeck,
        narration: NarrationController,
        agent: Box<dyn AgentRuntime>,
        events: EventSink,
    ) -> Self {
        let editor = EditorOverlay::new(&deck);
        let deck = deck::shared(deck);
        let gateway = ActionGateway::new(Arc::clone(&deck), Arc::new(narration), events);
        Self {
            deck,
            editor: Mutex::new(editor),
            gateway,
            agent,
            background_endpoint: SlideConfig::default().background_endpoint,
        }
    }

    /// Presenter wired to the configured player, speech endpoint and agent.
    pub fn from_config(config: &SlideConfig, events: EventSink) -> anyhow::Result<Self> {
        let settings = NarrationSettings::from_config(config)?;
        let factory: DeviceFactory = CommandPlayer::factory(config.player_command.clone())?;
        let narration = NarrationController::new(settings, factory);
        Ok(Self::new(
            SlideDeck::new(),
            narration,
            agent_from_config(config),
            events,
        )
        .with_background_endpoint(config.background_endpoint.clone()))
    }

    pub fn with_background_endpoint(mut self, endpoint: String) -> Self {
        self.background_endpoint = endpoint;
        self
    }

    pub fn gateway(&self) -> &ActionGateway {
        &self.gateway
    }

    pub fn catalog(&self) -> Vec<ActionSchema> {
        self.gateway.catalog()
    }

    pub fn add_blank_slide(&self) -> ControlOutcome {
        self.mutate(|deck| {
            deck.insert_after_current(Slide::blank());
            Ok(())
        })
    }

    pub fn delete_current_slide(&self) -> ControlOutcome {
        self.mutate(|deck| {
            if deck.delete_current() {
                Ok(())
            } else {
                Err(DisabledReason::SingleSlide)
            }
        })
    }

    pub fn previous_slide(&self) -> ControlOutcome {
        self.mutate(|deck| deck.move_prev().then_some(()).ok_or(DisabledReason::AtStart))
    }

    pub fn next_slide(&self) -> ControlOutcome {
        self.mutate(|deck| deck.move_next().then_some(()).ok_or(DisabledReason::AtEnd))
    }

    pub fn toggle_editor(&self) -> ControlOutcome {
        let _token = match self.acquire() {
            Ok(token) => token,
            Err(reason) => return ControlOutcome::Disabled(reason),
        };
        let deck = deck::lock(&self.deck);
        self.editor().toggle(&deck);
        ControlOutcome::Applied
    }

    /// Change the editor buffer. Allowed at any time while the overlay is open.
    pub fn edit(&self, f: impl FnOnce(&mut EditBuffer)) -> ControlOutcome {
        let mut editor = self.editor();
        if !editor.is_visible() {
            return ControlOutcome::Disabled(DisabledReason::EditorHidden);
        }
        f(editor.buffer_mut());
        ControlOutcome::Applied
    }

    pub fn save_editor(&self) -> ControlOutcome {
        let _token = match self.acquire() {
            Ok(token) => token,
            Err(reason) => return ControlOutcome::Disabled(reason),
        };
        let mut deck = deck::lock(&self.deck);
        let mut editor = self.editor();
        if !editor.is_visible() {
            return ControlOutcome::Disabled(DisabledReason::EditorHidden);
        }
        editor.save(&mut deck);
        tracing::debug!(index = deck.current_index(), "slide saved from editor");
        ControlOutcome::Applied
    }

    pub fn cancel_editor(&self) {
        self.editor().cancel();
    }

    pub async fn generate_slide(&self) -> Result<AgentReport, GatewayError> {
        self.gateway.generate_slide(self.agent.as_ref()).await
    }

    pub async fn narrate(&self) -> Result<AgentReport, GatewayError> {
        if self.gateway.narration().is_speaking() {
            return Err(NarrationError::AlreadyPlaying.into());
        }
        self.gateway.narrate_current_slide(self.agent.as_ref()).await
    }

    pub async fn chat(&self, message: &str) -> Result<AgentReport, GatewayError> {
        self.gateway.chat(self.agent.as_ref(), message).await
    }

    /// Invoke a catalog entry by name with this presenter's agent.
    pub async fn invoke(&self, call: ActionCall) -> Result<ActionOutcome, GatewayError> {
        self.gateway.invoke(self.agent.as_ref(), call).await
    }

    pub fn controls(&self) -> Controls {
        let deck = deck::lock(&self.deck);
        self.controls_for(&deck)
    }

    /// Snapshot for rendering. Keeps a hidden editor in step with the deck.
    pub fn view(&self) -> SlideView {
        let deck = deck::lock(&self.deck);
        let mut editor = self.editor();
        editor.sync(&deck);
        let slide = deck.current().clone();
        let background = match background_url(&self.background_endpoint, &slide.background_query) {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::debug!(error = %err, "no background for slide");
                None
            }
        };
        SlideView {
            index: deck.current_index(),
            len: deck.len(),
            slide,
            background,
            editor: editor.is_visible().then(|| editor.buffer().clone()),
            narration: self.gateway.narration().state(),
            busy: self.gateway.active_task().map(|task| task.kind),
            controls: self.controls_for(&deck),
        }
    }

    fn controls_for(&self, deck: &SlideDeck) -> Controls {
        let idle = !self.gateway.is_busy();
        Controls {
            add: idle,
            generate: idle,
            delete: idle && deck.can_delete(),
            narrate: idle && !self.gateway.narration().is_speaking(),
            edit: idle,
            previous: idle && deck.can_move_prev(),
            next: idle && deck.can_move_next(),
            chat: idle,
        }
    }

    fn mutate(&self, f: impl FnOnce(&mut SlideDeck) -> Result<(), DisabledReason>) -> ControlOutcome {
        let _token = match self.acquire() {
            Ok(token) => token,
            Err(reason) => return ControlOutcome::Disabled(reason),
        };
        let mut deck = deck::lock(&self.deck);
        match f(&mut deck) {
            Ok(()) => ControlOutcome::Applied,
            Err(reason) => {
                tracing::debug!(?reason, "control refused");
                ControlOutcome::Disabled(reason)
            }
        }
    }

    fn acquire(&self) -> Result<TaskToken, DisabledReason> {
        self.gateway
            .flight()
            .acquire(TaskKind::Direct)
            .map_err(|err| match err {
                GatewayError::Busy { active } => DisabledReason::Busy(active),
                _ => DisabledReason::Busy(TaskKind::Direct),
            })
    }

    fn editor(&self) -> MutexGuard<'_, EditorOverlay> {
        self.editor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentTask, OfflineAgent};
    use crate::error::AgentError;
    use crate::narration::testing::{settings, ScriptedDevice};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    struct ParkedAgent {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl AgentRuntime for ParkedAgent {
        async fn run_task(&self, _task: AgentTask<'_>) -> Result<AgentReport, AgentError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(AgentReport::default())
        }
    }

    fn presenter_with(deck: SlideDeck, agent: Box<dyn AgentRuntime>) -> (Presenter, ScriptedDevice) {
        let device = ScriptedDevice::default();
        let narration = NarrationController::new(settings(), device.factory());
        (
            Presenter::new(deck, narration, agent, EventSink::default()),
            device,
        )
    }

    fn presenter() -> Presenter {
        presenter_with(SlideDeck::new(), Box::new(OfflineAgent)).0
    }

    #[test]
    fn initial_view_shows_welcome_slide() {
        let presenter = presenter();
        let view = presenter.view();
        assert_eq!((view.index, view.len), (0, 1));
        assert_eq!(view.slide, Slide::welcome());
        assert_eq!(view.background.unwrap().query(), Some("hello"));
        assert_eq!(view.editor, None);
        assert_eq!(view.busy, None);
        assert_eq!(
            view.controls,
            Controls {
                add: true,
                generate: true,
                delete: false,
                narrate: true,
                edit: true,
                previous: false,
                next: false,
                chat: true,
            }
        );
    }

    #[test]
    fn guards_report_reasons() {
        let presenter = presenter();
        assert_eq!(
            presenter.delete_current_slide(),
            ControlOutcome::Disabled(DisabledReason::SingleSlide)
        );
        assert_eq!(
            presenter.previous_slide(),
            ControlOutcome::Disabled(DisabledReason::AtStart)
        );
        assert_eq!(
            presenter.next_slide(),
            ControlOutcome::Disabled(DisabledReason::AtEnd)
        );
        assert!(!presenter.gateway().is_busy());
    }

    #[test]
    fn blank_slide_is_inserted_and_deletable() {
        let presenter = presenter();
        assert!(presenter.add_blank_slide().is_applied());
        let view = presenter.view();
        assert_eq!((view.index, view.len), (1, 2));
        assert_eq!(view.slide, Slide::blank());
        assert!(view.controls.delete);
        assert!(view.controls.previous);

        assert!(presenter.delete_current_slide().is_applied());
        let view = presenter.view();
        assert_eq!((view.index, view.len), (0, 1));
        assert_eq!(view.slide, Slide::welcome());
    }

    #[test]
    fn editor_save_updates_only_current_slide() {
        let presenter = presenter();
        presenter.add_blank_slide();

        assert_eq!(
            presenter.edit(|buf| buf.content = "x".to_string()),
            ControlOutcome::Disabled(DisabledReason::EditorHidden)
        );
        assert!(presenter.toggle_editor().is_applied());
        assert_eq!(presenter.view().editor, Some(EditBuffer::from_slide(&Slide::blank())));

        presenter.edit(|buf| {
            buf.content = "# Edited".to_string();
            buf.notes = "new notes".to_string();
        });
        assert!(presenter.save_editor().is_applied());

        let view = presenter.view();
        assert_eq!(view.editor, None);
        assert_eq!(view.slide, Slide::new("# Edited", "random", "new notes"));
        presenter.previous_slide();
        assert_eq!(presenter.view().slide, Slide::welcome());
    }

    #[test]
    fn cancel_discards_edits() {
        let presenter = presenter();
        presenter.toggle_editor();
        presenter.edit(|buf| buf.content.clear());
        presenter.cancel_editor();
        assert_eq!(presenter.view().slide, Slide::welcome());
        presenter.toggle_editor();
        assert_eq!(
            presenter.view().editor.map(|buf| buf.content),
            Some(Slide::welcome().content)
        );
    }

    #[tokio::test]
    async fn running_task_disables_every_control() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let (presenter, _) = presenter_with(
            SlideDeck::from_slides(vec![Slide::blank(), Slide::blank()]).unwrap(),
            Box::new(ParkedAgent {
                entered: Arc::clone(&entered),
                release: Arc::clone(&release),
            }),
        );
        presenter.toggle_editor();
        let presenter = Arc::new(presenter);

        let task = tokio::spawn({
            let presenter = Arc::clone(&presenter);
            async move { presenter.generate_slide().await }
        });
        entered.notified().await;

        let busy = ControlOutcome::Disabled(DisabledReason::Busy(TaskKind::GenerateSlide));
        assert_eq!(presenter.controls(), Controls::default());
        assert_eq!(presenter.add_blank_slide(), busy);
        assert_eq!(presenter.delete_current_slide(), busy);
        assert_eq!(presenter.next_slide(), busy);
        assert_eq!(presenter.save_editor(), busy);
        assert_eq!(presenter.view().busy, Some(TaskKind::GenerateSlide));
        assert!(matches!(
            presenter.narrate().await,
            Err(GatewayError::Busy { .. })
        ));
        assert_eq!(presenter.view().len, 2);

        release.notify_one();
        task.await.unwrap().unwrap();
        assert!(presenter.next_slide().is_applied());
    }

    #[tokio::test]
    async fn hidden_editor_follows_agent_changes() {
        let presenter = presenter();
        presenter.generate_slide().await.unwrap();
        presenter.toggle_editor();
        let view = presenter.view();
        assert_eq!(view.index, 1);
        assert_eq!(view.editor, Some(EditBuffer::from_slide(&view.slide)));
    }

    #[tokio::test(start_paused = true)]
    async fn narrate_disables_speaker_until_done() {
        let (presenter, device) = presenter_with(
            SlideDeck::with_slide(Slide::new("# Hi", "x", "Hello all")),
            Box::new(OfflineAgent),
        );
        let presenter = Arc::new(presenter);
        let task = tokio::spawn({
            let presenter = Arc::clone(&presenter);
            async move { presenter.narrate().await }
        });

        let mut state = presenter.gateway().narration().subscribe();
        state
            .wait_for(|s| matches!(s, NarrationState::Playing { .. }))
            .await
            .unwrap();
        assert!(!presenter.controls().narrate);
        assert_eq!(
            presenter.view().narration,
            NarrationState::Playing {
                text: "Hello all".to_string()
            }
        );

        device.finish();
        task.await.unwrap().unwrap();
        assert!(presenter.controls().narrate);
    }
}
