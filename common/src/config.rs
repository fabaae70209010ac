use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Slide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideConfig {
    pub api_key: Option<String>,
    pub model: String,
    /// Text-to-speech endpoint; the narration text is sent as `?text=`.
    pub tts_endpoint: String,
    /// Background image URL template; the query is appended after `?`.
    pub background_endpoint: String,
    /// Player program and leading arguments; the audio file path is appended.
    pub player_command: Vec<String>,
    pub settle_delay_ms: u64,
    /// Unset means narration waits for the player indefinitely.
    pub narration_timeout_secs: Option<u64>,
    pub max_agent_rounds: usize,
    pub log_path: PathBuf,
}

impl Default for SlideConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            tts_endpoint: "http://localhost:3000/api/tts".to_string(),
            background_endpoint: "https://source.unsplash.com/featured/".to_string(),
            player_command: vec![
                "ffplay".to_string(),
                "-nodisp".to_string(),
                "-autoexit".to_string(),
                "-loglevel".to_string(),
                "quiet".to_string(),
            ],
            settle_delay_ms: 500,
            narration_timeout_secs: None,
            max_agent_rounds: 8,
            log_path: PathBuf::from("/tmp/slide.log"),
        }
    }
}

impl SlideConfig {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Cannot find config directory"))?
            .join("slide");

        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir.join("config.json"))
    }

    /// Load configuration from the default location, then apply environment overrides.
    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path).await?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from `path`; a missing file yields the defaults.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: SlideConfig = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `OPENAI_API_KEY` / `SLIDE_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup("SLIDE_MODEL") {
            self.model = model;
        }
        if let Some(endpoint) = lookup("SLIDE_TTS_ENDPOINT") {
            self.tts_endpoint = endpoint;
        }
        if let Some(endpoint) = lookup("SLIDE_BACKGROUND_ENDPOINT") {
            self.background_endpoint = endpoint;
        }
        if let Some(player) = lookup("SLIDE_PLAYER") {
            self.player_command = player.split_whitespace().map(str::to_string).collect();
        }
        if let Some(path) = lookup("SLIDE_LOG_PATH") {
            self.log_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup("SLIDE_NARRATION_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.narration_timeout_secs = Some(secs);
        }
    }
}
