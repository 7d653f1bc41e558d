use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::core::broadcast::ReconnectPolicy;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BlastrConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// When unset the API is open, which is only sane on loopback.
    #[serde(default)]
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_delay_secs")]
    pub default_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[default]
    DryRun,
    Twilio,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dry-run" | "dry_run" | "dryrun" => Some(ProviderKind::DryRun),
            "twilio" => Some(ProviderKind::Twilio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default)]
    pub dry_run: DryRunConfig,

    #[serde(default)]
    pub twilio: TwilioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DryRunConfig {
    #[serde(default = "default_pair_after_ms")]
    pub pair_after_ms: u64,

    #[serde(default = "default_send_latency_ms")]
    pub send_latency_ms: u64,

    /// Recipients that always fail, for rehearsing partial failures.
    #[serde(default)]
    pub fail_numbers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,

    #[serde(default)]
    pub auth_token: String,

    #[serde(default)]
    pub from_number: String,

    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    4000
}
fn default_delay_secs() -> u64 {
    5
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_pair_after_ms() -> u64 {
    3000
}
fn default_send_latency_ms() -> u64 {
    250
}
fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_token: None,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            default_delay_secs: default_delay_secs(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            pair_after_ms: default_pair_after_ms(),
            send_latency_ms: default_send_latency_ms(),
            fail_numbers: Vec::new(),
        }
    }
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            api_base: default_twilio_api_base(),
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl BlastrConfig {
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join(CONFIG_FILE);
        if !config_path.exists() {
            info!("No {} found, using defaults.", CONFIG_FILE);
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

        info!(
            "Loaded config: server={}:{}, provider={:?}, default delay={}s",
            config.server.host,
            config.server.port,
            config.provider.kind,
            config.broadcast.default_delay_secs
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
