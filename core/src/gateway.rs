use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use slide_common::{DeckSnapshot, Slide};
use slide_protocol::{Event, TaskKind};

use crate::actions::{
    ActionArgs, ActionCall, ActionHandler, ActionOutcome, ActionRegistry, ActionSchema, ArgSchema,
    ArgType,
};
use crate::agent::{AgentReport, AgentRuntime, AgentTask};
use crate::deck::{self, SharedDeck};
use crate::error::{ActionError, GatewayError};
use crate::narration::NarrationController;

pub const ADD_SLIDE: &str = "addSlide";
pub const DELETE_SLIDE: &str = "deleteCurrentSlide";
pub const GENERATE_SLIDE: &str = "generateSlide";
pub const NARRATE_SLIDE: &str = "narrateCurrentSlide";
pub const GENERATE_SPEECH: &str = "generateSpeech";

const GENERATE_SLIDE_INSTRUCTIONS: &str = "Make the next slide related to the overall topic of the presentation. It will be inserted after the current slide.";
const NARRATE_INSTRUCTIONS: &str = "Generate a speech for the current slide. Make sure to consider the speaker's notes and to reference the slide's content.";

/// Optional event channel towards the view layer.
#[derive(Clone, Default)]
pub struct EventSink(Option<async_channel::Sender<Event>>);

impl EventSink {
    pub fn new(tx: async_channel::Sender<Event>) -> Self {
        Self(Some(tx))
    }

    pub fn channel() -> (Self, async_channel::Receiver<Event>) {
        let (tx, rx) = async_channel::unbounded();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.0 {
            let _ = tx.try_send(event);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTask {
    pub id: String,
    pub kind: TaskKind,
}

/// Guard allowing at most one agent-directed task at a time.
#[derive(Clone, Default)]
pub struct SingleFlight {
    active: Arc<Mutex<Option<ActiveTask>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, kind: TaskKind) -> Result<TaskToken, GatewayError> {
        let mut active = self.slot();
        if let Some(task) = active.as_ref() {
            return Err(GatewayError::Busy { active: task.kind });
        }
        let id = uuid::Uuid::new_v4().to_string();
        *active = Some(ActiveTask {
            id: id.clone(),
            kind,
        });
        Ok(TaskToken {
            id,
            kind,
            active: Arc::clone(&self.active),
        })
    }

    pub fn active(&self) -> Option<ActiveTask> {
        self.slot().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<ActiveTask>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of owning the single flight; released when dropped.
#[derive(Debug)]
pub struct TaskToken {
    id: String,
    kind: TaskKind,
    active: Arc<Mutex<Option<ActiveTask>>>,
}

impl TaskToken {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }
}

impl Drop for TaskToken {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|task| task.id == self.id) {
            *active = None;
        }
    }
}

/// The actions an agent may call while it holds a task token.
pub struct ActionScope<'a> {
    registry: &'a ActionRegistry,
    token: &'a TaskToken,
    events: &'a EventSink,
}

impl<'a> ActionScope<'a> {
    pub fn new(registry: &'a ActionRegistry, token: &'a TaskToken, events: &'a EventSink) -> Self {
        Self {
            registry,
            token,
            events,
        }
    }

    pub fn task_id(&self) -> &str {
        self.token.id()
    }

    pub fn tools(&self) -> Vec<ActionSchema> {
        self.registry.schemas()
    }

    pub fn offers(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub async fn dispatch(&self, call: &ActionCall) -> Result<ActionOutcome, ActionError> {
        let result = self.registry.dispatch(call).await;
        match &result {
            Ok(ActionOutcome::Applied(message)) => self.events.emit(Event::ActionApplied {
                name: call.name.clone(),
                message: message.clone(),
            }),
            Ok(ActionOutcome::Refused(reason)) => self.events.emit(Event::ActionRejected {
                name: call.name.clone(),
                reason: reason.clone(),
            }),
            Err(err) => {
                tracing::warn!(task = %self.token.id(), action = %call.name, error = %err, "action rejected");
                self.events.emit(Event::ActionRejected {
                    name: call.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
        result
    }
}

struct AddSlide {
    deck: SharedDeck,
}

#[async_trait]
impl ActionHandler for AddSlide {
    async fn handle(&self, args: ActionArgs) -> Result<ActionOutcome, ActionError> {
        let slide = Slide::new(
            args.string("content")?,
            args.string("backgroundQuery")?,
            args.string("notes")?,
        );
        let mut deck = deck::lock(&self.deck);
        deck.insert_after_current(slide);
        Ok(ActionOutcome::Applied(format!(
            "Inserted slide {} of {}",
            deck.current_index() + 1,
            deck.len()
        )))
    }
}

struct DeleteSlide {
    deck: SharedDeck,
}

#[async_trait]
impl ActionHandler for DeleteSlide {
    async fn handle(&self, _args: ActionArgs) -> Result<ActionOutcome, ActionError> {
        let mut deck = deck::lock(&self.deck);
        if deck.delete_current() {
            Ok(ActionOutcome::Applied(format!(
                "Deleted slide; {} remaining",
                deck.len()
            )))
        } else {
            Ok(ActionOutcome::Refused(
                "The last remaining slide cannot be deleted".to_string(),
            ))
        }
    }
}

struct GenerateSpeech {
    narration: Arc<NarrationController>,
    events: EventSink,
}

#[async_trait]
impl ActionHandler for GenerateSpeech {
    async fn handle(&self, args: ActionArgs) -> Result<ActionOutcome, ActionError> {
        let text = args.string("text")?;
        self.events.emit(Event::NarrationStarted {
            text: text.to_string(),
        });
        let result = self.narration.start(text).await;
        self.events.emit(Event::NarrationFinished);
        result.map_err(|err| ActionError::Failed {
            action: GENERATE_SPEECH.to_string(),
            reason: err.to_string(),
        })?;
        Ok(ActionOutcome::Applied("Narration finished".to_string()))
    }
}

pub fn add_slide_schema() -> ActionSchema {
    ActionSchema::new(
        ADD_SLIDE,
        "Add a slide in the presentation you are giving. Call this function multiple times to present multiple slides.",
        vec![
            ArgSchema::required(
                "content",
                ArgType::String,
                "The text to display in the presentation slide. Use simple markdown to outline your slide, like a headline, lists, paragraphs, etc.",
            ),
            ArgSchema::required(
                "backgroundQuery",
                ArgType::String,
                "What to display in the background of the slide (i.e. 'dog' or 'house').",
            ),
            ArgSchema::required("notes", ArgType::String, "The speaker's notes for this slide."),
        ],
    )
}

pub fn delete_slide_schema() -> ActionSchema {
    ActionSchema::new(
        DELETE_SLIDE,
        "Delete the current slide. The last remaining slide cannot be deleted.",
        Vec::new(),
    )
}

pub fn generate_slide_schema() -> ActionSchema {
    ActionSchema::new(
        GENERATE_SLIDE,
        "Generate the next slide, related to the overall topic of the presentation, and insert it after the current slide.",
        Vec::new(),
    )
}

pub fn narrate_slide_schema() -> ActionSchema {
    ActionSchema::new(
        NARRATE_SLIDE,
        "Speak a narration of the current slide, based on its content and the speaker's notes.",
        Vec::new(),
    )
}

pub fn generate_speech_schema() -> ActionSchema {
    ActionSchema::new(
        GENERATE_SPEECH,
        "Generate a speech for the current slide.",
        vec![ArgSchema::required("text", ArgType::String, "The text to speak.")],
    )
}

/// Agent-readable description of the deck.
pub fn readables(deck: &DeckSnapshot) -> Vec<String> {
    let all = serde_json::to_string(&deck.slides).unwrap_or_default();
    let current = deck
        .current()
        .and_then(|slide| serde_json::to_string(slide).ok())
        .unwrap_or_default();
    vec![
        format!("These are all the slides: {all}"),
        format!("This is the current slide: {current}"),
    ]
}

/// Catalog of externally invocable operations, routed into the deck and the
/// narration controller under the single-flight guard.
pub struct ActionGateway {
    deck: SharedDeck,
    narration: Arc<NarrationController>,
    flight: SingleFlight,
    deck_actions: ActionRegistry,
    speech_actions: ActionRegistry,
    events: EventSink,
}

impl ActionGateway {
    pub fn new(deck: SharedDeck, narration: Arc<NarrationController>, events: EventSink) -> Self {
        let mut deck_actions = ActionRegistry::new();
        deck_actions.register(
            add_slide_schema(),
            Arc::new(AddSlide {
                deck: Arc::clone(&deck),
            }),
        );
        deck_actions.register(
            delete_slide_schema(),
            Arc::new(DeleteSlide {
                deck: Arc::clone(&deck),
            }),
        );

        let mut speech_actions = ActionRegistry::new();
        speech_actions.register(
            generate_speech_schema(),
            Arc::new(GenerateSpeech {
                narration: Arc::clone(&narration),
                events: events.clone(),
            }),
        );

        Self {
            deck,
            narration,
            flight: SingleFlight::new(),
            deck_actions,
            speech_actions,
            events,
        }
    }

    /// Every operation an agent runtime can discover.
    pub fn catalog(&self) -> Vec<ActionSchema> {
        let mut catalog = self.deck_actions.schemas();
        catalog.push(generate_slide_schema());
        catalog.push(narrate_slide_schema());
        catalog
    }

    pub fn flight(&self) -> &SingleFlight {
        &self.flight
    }

    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    pub fn active_task(&self) -> Option<ActiveTask> {
        self.flight.active()
    }

    pub fn narration(&self) -> &Arc<NarrationController> {
        &self.narration
    }

    /// Top-level invocation of a catalog entry by an agent runtime.
    pub async fn invoke(
        &self,
        agent: &dyn AgentRuntime,
        call: ActionCall,
    ) -> Result<ActionOutcome, GatewayError> {
        match call.name.as_str() {
            GENERATE_SLIDE => {
                generate_slide_schema().validate(&call.args)?;
                let report = self.generate_slide(agent).await?;
                Ok(ActionOutcome::Applied(report.summary()))
            }
            NARRATE_SLIDE => {
                narrate_slide_schema().validate(&call.args)?;
                let report = self.narrate_current_slide(agent).await?;
                Ok(ActionOutcome::Applied(report.summary()))
            }
            _ => {
                let token = self.flight.acquire(TaskKind::Direct)?;
                let scope = ActionScope::new(&self.deck_actions, &token, &self.events);
                Ok(scope.dispatch(&call).await?)
            }
        }
    }

    pub async fn generate_slide(&self, agent: &dyn AgentRuntime) -> Result<AgentReport, GatewayError> {
        let token = self.flight.acquire(TaskKind::GenerateSlide)?;
        self.run_task(agent, token, &self.deck_actions, GENERATE_SLIDE_INSTRUCTIONS.to_string())
            .await
    }

    /// Reset the narration device, then let the agent produce the speech
    /// through the nested `generateSpeech` action.
    pub async fn narrate_current_slide(
        &self,
        agent: &dyn AgentRuntime,
    ) -> Result<AgentReport, GatewayError> {
        let token = self.flight.acquire(TaskKind::NarrateSlide)?;
        self.narration.reset().await;
        self.run_task(agent, token, &self.speech_actions, NARRATE_INSTRUCTIONS.to_string())
            .await
    }

    /// Free-form conversation; the agent may use the deck actions.
    pub async fn chat(&self, agent: &dyn AgentRuntime, message: &str) -> Result<AgentReport, GatewayError> {
        let token = self.flight.acquire(TaskKind::Chat)?;
        self.run_task(agent, token, &self.deck_actions, message.to_string())
            .await
    }

    async fn run_task(
        &self,
        agent: &dyn AgentRuntime,
        token: TaskToken,
        registry: &ActionRegistry,
        instructions: String,
    ) -> Result<AgentReport, GatewayError> {
        let deck = deck::lock(&self.deck).snapshot();
        let (id, kind) = (token.id().to_string(), token.kind());
        tracing::info!(task = %id, %kind, "agent task started");
        self.events.emit(Event::TaskStarted {
            id: id.clone(),
            kind,
        });

        let task = AgentTask {
            kind,
            instructions,
            context: readables(&deck),
            deck,
            scope: ActionScope::new(registry, &token, &self.events),
        };
        let result = agent.run_task(task).await;

        match &result {
            Ok(report) => {
                if let Some(message) = &report.message {
                    self.events.emit(Event::AgentMessage {
                        message: message.clone(),
                    });
                }
                tracing::info!(task = %id, %kind, actions = report.actions, "agent task complete");
                self.events.emit(Event::TaskComplete { id, kind });
            }
            Err(err) => {
                tracing::warn!(task = %id, %kind, error = %err, "agent task failed");
                self.events.emit(Event::TaskFailed {
                    id,
                    kind,
                    message: err.to_string(),
                });
            }
        }
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{lock, shared, SlideDeck};
    use crate::error::AgentError;
    use crate::narration::testing::{settings, ScriptedDevice};
    use crate::narration::NarrationState;
    use tokio::sync::Notify;

    /// Agent that issues a fixed list of calls and records what it saw.
    #[derive(Default)]
    struct ScriptAgent {
        calls: Vec<ActionCall>,
        seen_tools: Mutex<Vec<String>>,
        seen_context: Mutex<Vec<String>>,
        results: Mutex<Vec<Result<ActionOutcome, ActionError>>>,
        fail: bool,
    }

    impl ScriptAgent {
        fn calling(calls: Vec<ActionCall>) -> Self {
            Self {
                calls,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl AgentRuntime for ScriptAgent {
        async fn run_task(&self, task: AgentTask<'_>) -> Result<AgentReport, AgentError> {
            *self.seen_tools.lock().unwrap() = task.scope.tools().into_iter().map(|s| s.name).collect();
            *self.seen_context.lock().unwrap() = task.context.clone();
            for call in &self.calls {
                let result = task.scope.dispatch(call).await;
                self.results.lock().unwrap().push(result);
            }
            if self.fail {
                return Err(AgentError::Unavailable {
                    reason: "offline".to_string(),
                });
            }
            Ok(AgentReport {
                message: None,
                actions: self.calls.len(),
            })
        }
    }

    /// Agent that parks until released, to observe the busy state.
    struct ParkedAgent {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl AgentRuntime for ParkedAgent {
        async fn run_task(&self, _task: AgentTask<'_>) -> Result<AgentReport, AgentError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(AgentReport::default())
        }
    }

    fn gateway_with(deck: SlideDeck) -> (Arc<ActionGateway>, SharedDeck, ScriptedDevice) {
        let deck = shared(deck);
        let device = ScriptedDevice::default();
        let narration = Arc::new(NarrationController::new(settings(), device.factory()));
        let gateway = Arc::new(ActionGateway::new(
            Arc::clone(&deck),
            narration,
            EventSink::default(),
        ));
        (gateway, deck, device)
    }

    fn add_slide(content: &str, background: &str, notes: &str) -> ActionCall {
        ActionCall::new(ADD_SLIDE)
            .arg("content", content)
            .arg("backgroundQuery", background)
            .arg("notes", notes)
    }

    #[test]
    fn catalog_lists_every_operation() {
        let (gateway, _, _) = gateway_with(SlideDeck::new());
        let names: Vec<String> = gateway.catalog().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![ADD_SLIDE, DELETE_SLIDE, GENERATE_SLIDE, NARRATE_SLIDE]
        );
        let add = &gateway.catalog()[0];
        assert_eq!(add.args.len(), 3);
        assert!(add.args.iter().all(|a| a.required && a.arg_type == ArgType::String));
    }

    #[tokio::test]
    async fn add_slide_inserts_after_cursor() {
        let (gateway, deck, _) =
            gateway_with(SlideDeck::with_slide(Slide::new("# Welcome", "hello", "")));
        let agent = ScriptAgent::default();

        let outcome = gateway
            .invoke(&agent, add_slide("# Point 1", "dog", "notes1"))
            .await
            .unwrap();

        assert!(matches!(outcome, ActionOutcome::Applied(_)));
        let deck = lock(&deck);
        assert_eq!(deck.len(), 2);
        assert_eq!(deck.current_index(), 1);
        assert_eq!(deck.slides()[1], Slide::new("# Point 1", "dog", "notes1"));
        assert!(!gateway.is_busy());
    }

    #[tokio::test]
    async fn missing_argument_is_rejected_without_mutation() {
        let (gateway, deck, _) = gateway_with(SlideDeck::new());
        let before = lock(&deck).snapshot();
        let agent = ScriptAgent::default();

        let call = ActionCall::new(ADD_SLIDE)
            .arg("content", "# Point")
            .arg("backgroundQuery", "dog");
        let err = gateway.invoke(&agent, call).await.unwrap_err();

        assert!(matches!(
            err,
            GatewayError::Action(ActionError::MissingArgument { ref argument, .. }) if argument == "notes"
        ));
        assert_eq!(lock(&deck).snapshot(), before);
        assert!(!gateway.is_busy());
    }

    #[tokio::test]
    async fn delete_on_single_slide_is_refused() {
        let (gateway, deck, _) = gateway_with(SlideDeck::new());
        let agent = ScriptAgent::default();
        let outcome = gateway
            .invoke(&agent, ActionCall::new(DELETE_SLIDE))
            .await
            .unwrap();
        assert!(matches!(outcome, ActionOutcome::Refused(_)));
        assert_eq!(lock(&deck).len(), 1);
    }

    #[tokio::test]
    async fn generate_slide_lets_agent_add_slides() {
        let (gateway, deck, _) = gateway_with(SlideDeck::new());
        let agent = ScriptAgent::calling(vec![add_slide("# Next", "tree", "talk")]);

        let report = gateway.generate_slide(&agent).await.unwrap();

        assert_eq!(report.actions, 1);
        assert_eq!(lock(&deck).current().content, "# Next");
        let tools = agent.seen_tools.lock().unwrap().clone();
        assert_eq!(tools, vec![ADD_SLIDE, DELETE_SLIDE]);
        let context = agent.seen_context.lock().unwrap().clone();
        assert!(context[0].starts_with("These are all the slides: "));
        assert!(context[1].contains("Welcome to our presentation"));
    }

    #[tokio::test]
    async fn agent_cannot_reach_task_actions_from_inside_a_task() {
        let (gateway, _, _) = gateway_with(SlideDeck::new());
        let agent = ScriptAgent::calling(vec![ActionCall::new(GENERATE_SLIDE)]);
        gateway.generate_slide(&agent).await.unwrap();
        let results = agent.results.lock().unwrap();
        assert!(matches!(results[0], Err(ActionError::UnknownAction { .. })));
    }

    #[tokio::test]
    async fn single_flight_rejects_concurrent_tasks() {
        let (gateway, deck, _) = gateway_with(SlideDeck::new());
        let parked = Arc::new(ParkedAgent {
            entered: Notify::new(),
            release: Notify::new(),
        });

        let running = tokio::spawn({
            let gateway = Arc::clone(&gateway);
            let parked = Arc::clone(&parked);
            async move { gateway.generate_slide(parked.as_ref()).await }
        });
        parked.entered.notified().await;

        assert!(gateway.is_busy());
        assert_eq!(
            gateway.active_task().map(|t| t.kind),
            Some(TaskKind::GenerateSlide)
        );
        let other = ScriptAgent::default();
        assert!(matches!(
            gateway.narrate_current_slide(&other).await,
            Err(GatewayError::Busy {
                active: TaskKind::GenerateSlide
            })
        ));
        assert!(matches!(
            gateway.invoke(&other, add_slide("x", "y", "z")).await,
            Err(GatewayError::Busy { .. })
        ));
        assert_eq!(lock(&deck).len(), 1);

        parked.release.notify_one();
        running.await.unwrap().unwrap();
        assert!(!gateway.is_busy());
    }

    #[tokio::test]
    async fn token_is_released_when_agent_fails() {
        let (gateway, _, _) = gateway_with(SlideDeck::new());
        let agent = ScriptAgent {
            fail: true,
            ..ScriptAgent::default()
        };
        let err = gateway.chat(&agent, "hello").await.unwrap_err();
        assert!(matches!(err, GatewayError::Agent(_)));
        assert!(!gateway.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn narrate_routes_speech_into_controller() {
        let (gateway, _, device) = gateway_with(SlideDeck::new());
        let agent = Arc::new(ScriptAgent::calling(vec![
            ActionCall::new(GENERATE_SPEECH).arg("text", "Welcome, everyone"),
        ]));

        let task = tokio::spawn({
            let gateway = Arc::clone(&gateway);
            let agent = Arc::clone(&agent);
            async move { gateway.narrate_current_slide(agent.as_ref()).await }
        });

        let mut state = gateway.narration().subscribe();
        state
            .wait_for(|s| matches!(s, NarrationState::Playing { .. }))
            .await
            .unwrap();
        assert!(gateway.is_busy());
        assert_eq!(device.state().created, 1);
        assert_eq!(
            device.state().loaded[0].query_pairs().next().map(|(_, v)| v.into_owned()),
            Some("Welcome, everyone".to_string())
        );

        device.finish();
        task.await.unwrap().unwrap();
        assert!(!gateway.is_busy());
        assert!(!gateway.narration().is_speaking());
        assert_eq!(agent.seen_tools.lock().unwrap().clone(), vec![GENERATE_SPEECH]);
    }

    #[tokio::test]
    async fn events_follow_task_lifecycle() {
        let deck = shared(SlideDeck::new());
        let device = ScriptedDevice::default();
        let narration = Arc::new(NarrationController::new(settings(), device.factory()));
        let (events, rx) = EventSink::channel();
        let gateway = ActionGateway::new(deck, narration, events);
        let agent = ScriptAgent::calling(vec![
            add_slide("# A", "a", ""),
            ActionCall::new(ADD_SLIDE),
        ]);

        gateway.generate_slide(&agent).await.unwrap();

        let events: Vec<Event> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(events[0], Event::TaskStarted { kind: TaskKind::GenerateSlide, .. }));
        assert!(matches!(events[1], Event::ActionApplied { .. }));
        assert!(matches!(events[2], Event::ActionRejected { .. }));
        assert!(matches!(events[3], Event::TaskComplete { .. }));
    }
}
