use std::io;
use std::sync::Arc;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use slide_core::{ControlOutcome, DisabledReason, EditBuffer, ErrorReporter, GatewayError, Presenter};
use slide_protocol::Event;
use tokio::time::{interval, Duration};

use crate::view;

const MAX_LOG: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Content,
    Background,
    Notes,
}

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::Content => "Content",
            Field::Background => "Background",
            Field::Notes => "Speaker notes",
        }
    }

    fn next(self) -> Self {
        match self {
            Field::Content => Field::Background,
            Field::Background => Field::Notes,
            Field::Notes => Field::Content,
        }
    }

    fn prev(self) -> Self {
        match self {
            Field::Content => Field::Notes,
            Field::Background => Field::Content,
            Field::Notes => Field::Background,
        }
    }

    fn of(self, buffer: &mut EditBuffer) -> &mut String {
        match self {
            Field::Content => &mut buffer.content,
            Field::Background => &mut buffer.background_query,
            Field::Notes => &mut buffer.notes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Present,
    Edit(Field),
    Chat,
}

/// Work that has to run off the input loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate,
    Narrate,
    Chat(String),
}

pub struct App {
    presenter: Arc<Presenter>,
    mode: Mode,
    input: String,
    log: Vec<String>,
    status: String,
    running: bool,
}

impl App {
    pub fn new(presenter: Arc<Presenter>) -> Self {
        Self {
            presenter,
            mode: Mode::Present,
            input: String::new(),
            log: Vec::new(),
            status: "Ready".to_string(),
            running: true,
        }
    }

    pub fn presenter(&self) -> &Presenter {
        &self.presenter
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        match self.mode {
            Mode::Present => self.present_key(key),
            Mode::Edit(field) => {
                self.edit_key(field, key);
                None
            }
            Mode::Chat => self.chat_key(key),
        }
    }

    fn present_key(&mut self, key: KeyEvent) -> Option<Command> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Left | KeyCode::Char('h') => {
                let outcome = self.presenter.previous_slide();
                self.report(outcome, "Previous slide");
            }
            KeyCode::Right | KeyCode::Char('l') => {
                let outcome = self.presenter.next_slide();
                self.report(outcome, "Next slide");
            }
            KeyCode::Char('a') => {
                let outcome = self.presenter.add_blank_slide();
                self.report(outcome, "Added blank slide");
            }
            KeyCode::Char('d') => {
                let outcome = self.presenter.delete_current_slide();
                self.report(outcome, "Deleted slide");
            }
            KeyCode::Char('e') => {
                let outcome = self.presenter.toggle_editor();
                if outcome.is_applied() {
                    self.mode = Mode::Edit(Field::Content);
                }
                self.report(outcome, "Editing slide");
            }
            KeyCode::Char('g') => return self.task(self.presenter.controls().generate, Command::Generate),
            KeyCode::Char('s') => return self.task(self.presenter.controls().narrate, Command::Narrate),
            KeyCode::Char('c') => {
                if self.presenter.controls().chat {
                    self.mode = Mode::Chat;
                    self.status = "Chat: Enter to send, Esc to leave".to_string();
                } else {
                    self.status = "Chat is disabled while a task runs".to_string();
                }
            }
            _ => {}
        }
        None
    }

    fn edit_key(&mut self, field: Field, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('s') if ctrl => {
                let outcome = self.presenter.save_editor();
                if outcome.is_applied() {
                    self.mode = Mode::Present;
                }
                self.report(outcome, "Slide saved");
            }
            KeyCode::Esc => {
                self.presenter.cancel_editor();
                self.mode = Mode::Present;
                self.status = "Edit cancelled".to_string();
            }
            KeyCode::Tab => self.mode = Mode::Edit(field.next()),
            KeyCode::BackTab => self.mode = Mode::Edit(field.prev()),
            KeyCode::Enter if field == Field::Content => {
                self.presenter.edit(|buf| field.of(buf).push('\n'));
            }
            KeyCode::Enter => self.mode = Mode::Edit(field.next()),
            KeyCode::Backspace => {
                self.presenter.edit(|buf| {
                    field.of(buf).pop();
                });
            }
            KeyCode::Char(c) if !ctrl => {
                self.presenter.edit(|buf| field.of(buf).push(c));
            }
            _ => {}
        }
    }

    fn chat_key(&mut self, key: KeyEvent) -> Option<Command> {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Present;
                self.status = "Ready".to_string();
            }
            KeyCode::Enter => {
                let message = self.input.trim().to_string();
                self.input.clear();
                self.mode = Mode::Present;
                if !message.is_empty() {
                    self.push_log(format!("You: {message}"));
                    return Some(Command::Chat(message));
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
        None
    }

    fn task(&mut self, enabled: bool, command: Command) -> Option<Command> {
        if enabled {
            Some(command)
        } else {
            self.status = match self.presenter.gateway().active_task() {
                Some(task) => format!("Busy with {}", task.kind),
                None => "Narration is already playing".to_string(),
            };
            None
        }
    }

    fn report(&mut self, outcome: ControlOutcome, applied: &str) {
        self.status = match outcome {
            ControlOutcome::Applied => applied.to_string(),
            ControlOutcome::Disabled(reason) => describe(reason),
        };
    }

    /// Record a gateway event in the activity log.
    pub fn apply_event(&mut self, event: Event) {
        let line = match event {
            Event::TaskStarted { kind, .. } => {
                self.status = format!("Running {kind}...");
                format!("▶ {kind} started")
            }
            Event::TaskComplete { kind, .. } => {
                self.status = "Ready".to_string();
                format!("✔ {kind} complete")
            }
            Event::TaskFailed { kind, message, .. } => {
                self.status = format!("{kind} failed");
                format!("✖ {kind} failed: {message}")
            }
            Event::ActionApplied { name, message } => format!("{name}: {message}"),
            Event::ActionRejected { name, reason } => format!("{name} rejected: {reason}"),
            Event::NarrationStarted { text } => format!("🔊 {text}"),
            Event::NarrationFinished => "Narration finished".to_string(),
            Event::AgentMessage { message } => format!("Assistant: {message}"),
        };
        self.push_log(line);
    }

    pub fn task_result(&mut self, result: std::result::Result<(), GatewayError>) {
        if let Err(err) = result {
            let message = ErrorReporter::format_gateway_error(&err);
            self.status = message.lines().next().unwrap_or_default().to_string();
            self.push_log(message);
        }
    }

    fn push_log(&mut self, line: String) {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.log.push(format!("[{stamp}] {line}"));
        if self.log.len() > MAX_LOG {
            let excess = self.log.len() - MAX_LOG;
            self.log.drain(..excess);
        }
    }

    /// Run `command` on the runtime; its result comes back on `done`.
    fn spawn(&self, command: Command, done: async_channel::Sender<std::result::Result<(), GatewayError>>) {
        let presenter = Arc::clone(&self.presenter);
        tokio::spawn(async move {
            let result = match command {
                Command::Generate => presenter.generate_slide().await,
                Command::Narrate => presenter.narrate().await,
                Command::Chat(message) => presenter.chat(&message).await,
            };
            let _ = done.send(result.map(|_| ())).await;
        });
    }
}

pub fn describe(reason: DisabledReason) -> String {
    match reason {
        DisabledReason::Busy(kind) => format!("Disabled while {kind} runs"),
        DisabledReason::SingleSlide => "The last slide cannot be deleted".to_string(),
        DisabledReason::AtStart => "Already at the first slide".to_string(),
        DisabledReason::AtEnd => "Already at the last slide".to_string(),
        DisabledReason::EditorHidden => "Open the editor first".to_string(),
    }
}

pub async fn run_app(presenter: Arc<Presenter>, events: async_channel::Receiver<Event>) -> Result<()> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, App::new(presenter), events).await;

    // restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

async fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    events: async_channel::Receiver<Event>,
) -> Result<()> {
    let (done_tx, done_rx) = async_channel::unbounded();
    let mut tick_interval = interval(Duration::from_millis(250));

    while app.is_running() {
        terminal.draw(|f| view::ui(f, &app))?;

        tokio::select! {
            _ = tick_interval.tick() => {}
            Ok(event) = events.recv() => app.apply_event(event),
            Ok(result) = done_rx.recv() => app.task_result(result),
            polled = tokio::task::spawn_blocking(|| event::poll(Duration::from_millis(50))) => {
                if let Ok(Ok(true)) = polled {
                    if let TermEvent::Key(key) = event::read()? {
                        if let Some(command) = app.handle_key(key) {
                            app.spawn(command, done_tx.clone());
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
