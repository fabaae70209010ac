use std::time::Duration;

use anyhow::Context;
use reqwest::Url;
use slide_common::SlideConfig;
use tokio::sync::{oneshot, watch, Mutex};

use crate::error::NarrationError;

/// Audio output owned exclusively by the [`NarrationController`].
pub trait PlaybackDevice: Send {
    fn load(&mut self, source: Url);

    /// Begin playing the loaded source. The handle resolves once playback
    /// ends; pausing or reloading the device invalidates it.
    fn play(&mut self) -> Result<PlaybackHandle, NarrationError>;

    fn pause(&mut self);

    fn rewind(&mut self);
}

/// Builds the playback device the first time narration needs one.
pub type DeviceFactory = Box<dyn Fn() -> Box<dyn PlaybackDevice> + Send + Sync>;

/// Device-side half of a playback: signals the end of playback exactly once.
#[derive(Debug)]
pub struct PlaybackCompletion(oneshot::Sender<()>);

impl PlaybackCompletion {
    pub fn finish(self) {
        let _ = self.0.send(());
    }
}

/// Caller-side half of a playback.
#[derive(Debug)]
pub struct PlaybackHandle(oneshot::Receiver<()>);

impl PlaybackHandle {
    pub fn channel() -> (PlaybackCompletion, PlaybackHandle) {
        let (tx, rx) = oneshot::channel();
        (PlaybackCompletion(tx), PlaybackHandle(rx))
    }

    /// Resolves when playback ends, or with `Interrupted` once the device
    /// drops the completion.
    pub async fn ended(self) -> Result<(), NarrationError> {
        self.0.await.map_err(|_| NarrationError::Interrupted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationState {
    Idle,
    Playing { text: String },
}

#[derive(Debug, Clone)]
pub struct NarrationSettings {
    pub tts_endpoint: Url,
    pub settle_delay: Duration,
    pub timeout: Option<Duration>,
}

impl NarrationSettings {
    pub fn new(tts_endpoint: Url) -> Self {
        Self {
            tts_endpoint,
            settle_delay: Duration::from_millis(500),
            timeout: None,
        }
    }

    pub fn from_config(config: &SlideConfig) -> anyhow::Result<Self> {
        let tts_endpoint = Url::parse(&config.tts_endpoint)
            .with_context(|| format!("invalid tts endpoint {:?}", config.tts_endpoint))?;
        Ok(Self {
            tts_endpoint,
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            timeout: config.narration_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Retrieval locator for `text`: the endpoint with `text` as a query parameter.
    pub fn locator(&self, text: &str) -> Url {
        let mut url = self.tts_endpoint.clone();
        url.query_pairs_mut().append_pair("text", text);
        url
    }
}

struct Inner {
    device: Option<Box<dyn PlaybackDevice>>,
    /// Bumped by every start and reset; a playback only returns the
    /// controller to idle if no newer generation exists.
    generation: u64,
}

/// Sequences narration playback as a single-flight, awaitable operation.
pub struct NarrationController {
    settings: NarrationSettings,
    factory: DeviceFactory,
    inner: Mutex<Inner>,
    state: watch::Sender<NarrationState>,
}

impl NarrationController {
    pub fn new(settings: NarrationSettings, factory: DeviceFactory) -> Self {
        let (state, _) = watch::channel(NarrationState::Idle);
        Self {
            settings,
            factory,
            inner: Mutex::new(Inner {
                device: None,
                generation: 0,
            }),
            state,
        }
    }

    pub fn settings(&self) -> &NarrationSettings {
        &self.settings
    }

    pub fn state(&self) -> NarrationState {
        self.state.borrow().clone()
    }

    pub fn is_speaking(&self) -> bool {
        matches!(*self.state.borrow(), NarrationState::Playing { .. })
    }

    pub fn subscribe(&self) -> watch::Receiver<NarrationState> {
        self.state.subscribe()
    }

    /// Create the device if there is none yet, otherwise stop it and rewind
    /// to the start. Any pending `start` resolves with `Interrupted`.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        match inner.device.as_mut() {
            Some(device) => {
                device.pause();
                device.rewind();
            }
            None => inner.device = Some((self.factory)()),
        }
        inner.generation += 1;
        self.state.send_replace(NarrationState::Idle);
    }

    /// Play `text` and suspend until playback has ended and the settle delay
    /// has passed.
    ///
    /// Without a configured timeout this waits for as long as the device
    /// takes; a device that never ends keeps the caller suspended.
    pub async fn start(&self, text: &str) -> Result<(), NarrationError> {
        let (handle, generation) = {
            let mut inner = self.inner.lock().await;
            if self.is_speaking() {
                return Err(NarrationError::AlreadyPlaying);
            }
            let source = self.settings.locator(text);
            let device = inner.device.get_or_insert_with(|| (self.factory)());
            device.load(source);
            let handle = device.play()?;
            inner.generation += 1;
            self.state.send_replace(NarrationState::Playing {
                text: text.to_string(),
            });
            (handle, inner.generation)
        };
        tracing::info!(generation, chars = text.len(), "narration started");

        let ended = match self.settings.timeout {
            None => handle.ended().await,
            Some(limit) => match tokio::time::timeout(limit, handle.ended()).await {
                Ok(ended) => ended,
                Err(_) => {
                    tracing::warn!(generation, "narration stalled; resetting device");
                    self.abandon(generation).await;
                    return Err(NarrationError::Stalled {
                        timeout_secs: limit.as_secs(),
                    });
                }
            },
        };
        if let Err(err) = ended {
            tracing::debug!(generation, "narration interrupted");
            return Err(err);
        }

        tokio::time::sleep(self.settings.settle_delay).await;

        let inner = self.inner.lock().await;
        if inner.generation == generation {
            self.state.send_replace(NarrationState::Idle);
        }
        tracing::info!(generation, "narration finished");
        Ok(())
    }

    async fn abandon(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        if let Some(device) = inner.device.as_mut() {
            device.pause();
            device.rewind();
        }
        inner.generation += 1;
        self.state.send_replace(NarrationState::Idle);
    }
}
