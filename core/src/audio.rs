use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::NarrationError;
use crate::narration::{DeviceFactory, PlaybackDevice, PlaybackHandle};

/// Plays narration audio through an external player program.
///
/// The audio is fetched from the loaded locator into a temporary file which
/// is handed to the player as its last argument. Playback ends when the
/// player exits successfully. A failed fetch or player run is logged and the
/// playback is left pending, like a player that never reports the end.
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    http: reqwest::Client,
    source: Option<Url>,
    playback: Option<JoinHandle<()>>,
}

impl CommandPlayer {
    pub fn new(command: &[String]) -> Result<Self, NarrationError> {
        let (program, args) = command.split_first().ok_or_else(|| NarrationError::Device {
            reason: "player command is empty".to_string(),
        })?;
        Ok(Self::from_parts(program.clone(), args.to_vec()))
    }

    fn from_parts(program: String, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            http: reqwest::Client::new(),
            source: None,
            playback: None,
        }
    }

    /// Factory for the narration controller; validates the command up front.
    pub fn factory(command: Vec<String>) -> Result<DeviceFactory, NarrationError> {
        let template = CommandPlayer::new(&command)?;
        let (program, args) = (template.program.clone(), template.args.clone());
        Ok(Box::new(move || {
            Box::new(CommandPlayer::from_parts(program.clone(), args.clone())) as Box<dyn PlaybackDevice>
        }))
    }

    fn stop(&mut self) {
        if let Some(task) = self.playback.take() {
            task.abort();
        }
    }
}

impl PlaybackDevice for CommandPlayer {
    fn load(&mut self, source: Url) {
        self.stop();
        self.source = Some(source);
    }

    fn play(&mut self) -> Result<PlaybackHandle, NarrationError> {
        let source = self.source.clone().ok_or_else(|| NarrationError::Device {
            reason: "no audio source loaded".to_string(),
        })?;
        self.stop();

        let (completion, handle) = PlaybackHandle::channel();
        let http = self.http.clone();
        let program = self.program.clone();
        let args = self.args.clone();
        self.playback = Some(tokio::spawn(async move {
            match play_once(&http, &program, &args, source).await {
                Ok(()) => completion.finish(),
                Err(err) => {
                    tracing::warn!(error = %err, "narration playback failed");
                    let _held = completion;
                    std::future::pending::<()>().await;
                }
            }
        }));
        Ok(handle)
    }

    fn pause(&mut self) {
        self.stop();
    }

    fn rewind(&mut self) {
        // Every play starts a fresh player process from the beginning.
    }
}

impl Drop for CommandPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn play_once(http: &reqwest::Client, program: &str, args: &[String], source: Url) -> Result<()> {
    tracing::debug!(%source, "fetching narration audio");
    let bytes = http
        .get(source)
        .send()
        .await
        .context("requesting narration audio")?
        .error_for_status()?
        .bytes()
        .await?;

    let file = tempfile::Builder::new()
        .prefix("slide-tts-")
        .suffix(".mp3")
        .tempfile()?;
    tokio::fs::write(file.path(), &bytes).await?;

    let status = Command::new(program)
        .args(args)
        .arg(file.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .with_context(|| format!("spawning player {program}"))?;

    if !status.success() {
        return Err(anyhow!("player {program} exited with {status}"));
    }
    Ok(())
}
