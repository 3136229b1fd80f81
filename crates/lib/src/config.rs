//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay/config.json`), an optional `.env` file,
//! and the environment. Environment values override the file. [`Config::validate`] turns the
//! loose, partially-filled config into [`RelaySettings`], which is what the bot runs on.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemma-3n-e4b-it";
pub const DEFAULT_SESSION_NAME: &str = "default_session";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Channel settings (Telegram bot and counterpart).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Gemini credentials, model and seed prompt.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Label for the conversation session, used in logs. Overridden by SESSION_NAME env.
    #[serde(default)]
    pub session_name: Option<String>,

    /// Relay queue and timeout tuning.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// Numeric Telegram user id of the counterpart. Overridden by TARGET_USER_ID env.
    pub target_user_id: Option<i64>,
    /// Bot API base URL (default https://api.telegram.org). Overridden by TELEGRAM_API_BASE env.
    pub api_base: Option<String>,
}

/// Gemini provider config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// API key. Overridden by GEMINI_API_KEY env.
    pub api_key: Option<String>,
    /// Model name (default "gemma-3n-e4b-it"). Overridden by GEMINI_MODEL env.
    pub model: Option<String>,
    /// Persona preamble seeded as the first user turn. Overridden by GEMINI_PROMPT env.
    pub prompt: Option<String>,
    /// API base URL (default https://generativelanguage.googleapis.com/v1beta). Overridden by GEMINI_BASE_URL env.
    pub base_url: Option<String>,
}

/// Relay tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Upper bound on one provider round trip; expiry answers with the apology.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,

    /// How long queued exchanges may keep running after a shutdown signal.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// Capacity of the inbound and relay queues.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_reply_timeout_secs() -> u64 {
    120
}

fn default_drain_timeout_secs() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            reply_timeout_secs: default_reply_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Fully validated settings. Every required value is present and non-empty.
#[derive(Clone)]
pub struct RelaySettings {
    pub bot_token: String,
    pub telegram_api_base: Option<String>,
    pub target_user_id: i64,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: Option<String>,
    pub seed_prompt: String,
    pub session_name: String,
    pub reply_timeout: Duration,
    pub drain_timeout: Duration,
    pub queue_capacity: usize,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Config {
    /// Apply environment overrides. `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.channels.telegram.bot_token = Some(v);
        }
        if let Some(v) = get("TARGET_USER_ID") {
            let id = v
                .trim()
                .parse::<i64>()
                .with_context(|| format!("TARGET_USER_ID is not a numeric user id: {:?}", v))?;
            self.channels.telegram.target_user_id = Some(id);
        }
        if let Some(v) = get("TELEGRAM_API_BASE") {
            self.channels.telegram.api_base = Some(v);
        }
        if let Some(v) = get("GEMINI_API_KEY") {
            self.gemini.api_key = Some(v);
        }
        if let Some(v) = get("GEMINI_MODEL") {
            self.gemini.model = Some(v);
        }
        if let Some(v) = get("GEMINI_PROMPT") {
            self.gemini.prompt = Some(v);
        }
        if let Some(v) = get("GEMINI_BASE_URL") {
            self.gemini.base_url = Some(v);
        }
        if let Some(v) = get("SESSION_NAME") {
            self.session_name = Some(v);
        }
        Ok(())
    }

    /// Check that every required value is present. Reports all missing fields at once.
    pub fn validate(&self) -> Result<RelaySettings> {
        let telegram = &self.channels.telegram;
        let bot_token = non_empty(telegram.bot_token.as_ref());
        let api_key = non_empty(self.gemini.api_key.as_ref());
        // The prompt is used verbatim; only reject a blank one.
        let prompt = self
            .gemini
            .prompt
            .clone()
            .filter(|s| !s.trim().is_empty());

        let mut missing = Vec::new();
        if bot_token.is_none() {
            missing.push("channels.telegram.botToken (TELEGRAM_BOT_TOKEN)");
        }
        if telegram.target_user_id.is_none() {
            missing.push("channels.telegram.targetUserId (TARGET_USER_ID)");
        }
        if api_key.is_none() {
            missing.push("gemini.apiKey (GEMINI_API_KEY)");
        }
        if prompt.is_none() {
            missing.push("gemini.prompt (GEMINI_PROMPT)");
        }
        if !missing.is_empty() {
            anyhow::bail!("missing required configuration: {}", missing.join(", "));
        }
        if self.relay.reply_timeout_secs == 0 {
            anyhow::bail!("relay.replyTimeoutSecs must be greater than zero");
        }
        if self.relay.queue_capacity == 0 {
            anyhow::bail!("relay.queueCapacity must be greater than zero");
        }

        Ok(RelaySettings {
            bot_token: bot_token.unwrap_or_default(),
            telegram_api_base: non_empty(telegram.api_base.as_ref()),
            target_user_id: telegram.target_user_id.unwrap_or_default(),
            gemini_api_key: api_key.unwrap_or_default(),
            gemini_model: non_empty(self.gemini.model.as_ref())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url: non_empty(self.gemini.base_url.as_ref()),
            seed_prompt: prompt.unwrap_or_default(),
            session_name: non_empty(self.session_name.as_ref())
                .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
            reply_timeout: Duration::from_secs(self.relay.reply_timeout_secs),
            drain_timeout: Duration::from_secs(self.relay.drain_timeout_secs),
            queue_capacity: self.relay.queue_capacity,
        })
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load variables from a `.env` file into the process environment. With no explicit path,
/// looks for `.env` in the current directory and its parents; a missing file is not an error.
pub fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => dotenv::from_path(p)
            .with_context(|| format!("loading env file {}", p.display()))?,
        None => {
            if let Ok(found) = dotenv::dotenv() {
                log::debug!("loaded env file {}", found.display());
            }
        }
    }
    Ok(())
}

/// Read the JSON config file. Missing file => default config.
pub fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}

/// Load config from the given path (or the default path) and apply environment overrides.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = read_config_file(&path)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok((config, path))
}

/// Write a template config file if none exists. Returns true when a file was written.
pub fn write_template(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }
    let template = Config {
        channels: ChannelsConfig {
            telegram: TelegramChannelConfig {
                bot_token: Some(String::new()),
                target_user_id: None,
                api_base: None,
            },
        },
        gemini: GeminiConfig {
            api_key: Some(String::new()),
            model: Some(DEFAULT_MODEL.to_string()),
            prompt: Some(String::new()),
            base_url: None,
        },
        session_name: Some(DEFAULT_SESSION_NAME.to_string()),
        relay: RelayConfig::default(),
    };
    let body = serde_json::to_string_pretty(&template).context("serializing config template")?;
    std::fs::write(path, body)
        .with_context(|| format!("writing config template to {}", path.display()))?;
    log::info!("created config template at {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> Config {
        let mut config = Config::default();
        let vars = env(&[
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TARGET_USER_ID", "42"),
            ("GEMINI_API_KEY", "key"),
            ("GEMINI_PROMPT", "You are a pirate."),
        ]);
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        config
    }

    #[test]
    fn defaults_fill_optional_values() {
        let settings = complete().validate().unwrap();
        assert_eq!(settings.target_user_id, 42);
        assert_eq!(settings.gemini_model, DEFAULT_MODEL);
        assert_eq!(settings.session_name, DEFAULT_SESSION_NAME);
        assert_eq!(settings.reply_timeout, Duration::from_secs(120));
        assert_eq!(settings.queue_capacity, 64);
        assert!(settings.telegram_api_base.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = serde_json::from_str(
            r#"{"gemini":{"model":"gemini-1.5-flash","apiKey":"file-key"},"sessionName":"file"}"#,
        )
        .unwrap();
        let vars = env(&[("GEMINI_MODEL", "gemini-2.0-flash"), ("SESSION_NAME", "  ")]);
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.gemini.model.as_deref(), Some("gemini-2.0-flash"));
        assert_eq!(config.gemini.api_key.as_deref(), Some("file-key"));
        // blank env values do not clobber the file
        assert_eq!(config.session_name.as_deref(), Some("file"));
    }

    #[test]
    fn non_numeric_target_user_id_is_rejected() {
        let mut config = Config::default();
        let vars = env(&[("TARGET_USER_ID", "@someone")]);
        let err = config.apply_env(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("TARGET_USER_ID"));
    }

    #[test]
    fn validate_lists_every_missing_field() {
        let err = Config::default().validate().err().unwrap().to_string();
        assert!(err.contains("TELEGRAM_BOT_TOKEN"));
        assert!(err.contains("TARGET_USER_ID"));
        assert!(err.contains("GEMINI_API_KEY"));
        assert!(err.contains("GEMINI_PROMPT"));
    }

    #[test]
    fn blank_prompt_is_missing() {
        let mut config = complete();
        config.gemini.prompt = Some("   ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let mut config = complete();
        config.relay.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn template_round_trips_and_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        assert!(write_template(&path).unwrap());
        assert!(!write_template(&path).unwrap());
        let config = read_config_file(&path).unwrap();
        assert_eq!(config.gemini.model.as_deref(), Some(DEFAULT_MODEL));
        assert_eq!(config.relay.drain_timeout_secs, 10);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config_file(&dir.path().join("absent.json")).unwrap();
        assert!(config.channels.telegram.bot_token.is_none());
    }
}
