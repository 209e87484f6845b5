//! Runtime configuration.

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root directory of the spool channel; sessions live under
    /// `<channel_root>/<name>/`.
    #[serde(default = "default_channel_root")]
    pub channel_root: PathBuf,
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_keystroke_delay_ms")]
    pub keystroke_delay_ms: u64,
    /// "paste" (bracketed paste) or "type" (per-character keystrokes).
    #[serde(default = "default_input_style")]
    pub input_style: String,
    #[serde(default)]
    pub mirror_lines: bool,
}

fn default_channel_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("termsync")
}

fn default_grace_seconds() -> u64 {
    5
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_keystroke_delay_ms() -> u64 {
    30
}

fn default_input_style() -> String {
    "paste".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_root: default_channel_root(),
            grace_seconds: default_grace_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            keystroke_delay_ms: default_keystroke_delay_ms(),
            input_style: default_input_style(),
            mirror_lines: false,
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from the default location (config/default.toml) or fall
    /// back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }
}
