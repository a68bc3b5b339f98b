use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::dispatcher::DEFAULT_MAX_NUMBER_OF_FAILURES;
use crate::summary::MetaEntry;
use crate::transport::DEFAULT_API_BASE;

const DEFAULT_CONFIG_NAME: &str = "slackrun.toml";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

pub const BOT_TOKEN_ENV: &str = "SLACK_BOT_USER_OAUTH_TOKEN";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SendResults {
    #[default]
    Always,
    OnFailure,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Step up one level per `-v` flag, saturating at trace.
    pub fn raised_by(self, steps: u8) -> Self {
        const ORDER: [LogLevel; 5] = [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ];
        let current = ORDER.iter().position(|level| *level == self).unwrap_or(2);
        ORDER[(current + steps as usize).min(ORDER.len() - 1)]
    }
}

#[derive(Debug, Deserialize)]
pub struct BotDestination {
    pub channels: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookDestination {
    pub webhook_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub send_results: SendResults,
    pub send_using_bot: Option<BotDestination>,
    pub send_using_webhook: Option<WebhookDestination>,
    /// Name of a registered sync layout.
    pub custom_layout: Option<String>,
    /// Name of a registered async layout.
    pub custom_layout_async: Option<String>,
    pub send_custom_blocks_in_thread_after_index: Option<usize>,
    #[serde(default)]
    pub slack_log_level: LogLevel,
    #[serde(default = "default_max_failures")]
    pub max_number_of_failures: usize,
    #[serde(default)]
    pub disable_unfurl: bool,
    #[serde(default)]
    pub show_in_thread: bool,
    #[serde(default)]
    pub upload_console_logs: bool,
    pub proxy: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub meta: Vec<MetaEntry>,
}

fn default_max_failures() -> usize {
    DEFAULT_MAX_NUMBER_OF_FAILURES
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Config {
    /// Load configuration from an explicit path, or search upward from current dir.
    pub fn load(path_override: Option<PathBuf>) -> Result<Self> {
        let path = match path_override {
            Some(p) => p,
            None => find_upwards(DEFAULT_CONFIG_NAME)
                .context("Failed to locate slackrun.toml in current or parent directories")?,
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Reading config file {}", path.display()))?;
        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Parsing TOML config {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("Validating config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.send_using_bot, &self.send_using_webhook) {
            (Some(_), Some(_)) => bail!("Only one of send_using_bot or send_using_webhook may be set"),
            (None, None) => bail!("One of send_using_bot or send_using_webhook must be set"),
            (Some(bot), None) if bot.channels.iter().all(|c| c.trim().is_empty()) => {
                bail!("send_using_bot.channels must list at least one channel")
            }
            (None, Some(hook)) if hook.webhook_url.trim().is_empty() => {
                bail!("send_using_webhook.webhook_url must not be empty")
            }
            _ => {}
        }
        if self.custom_layout.is_some() && self.custom_layout_async.is_some() {
            bail!("Only one of custom_layout or custom_layout_async may be set");
        }
        Ok(())
    }
}

fn find_upwards(file_name: &str) -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let candidate = dir.join(file_name);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}
