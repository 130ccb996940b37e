//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the vendor gateway token) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`. Bot
//! parameters are validated once at creation time — `ConfigurationInvalid`
//! never surfaces mid-loop.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::risk::RiskLimits;
use crate::signal::ScorerConfig;
use crate::staking::StakingConfig;
use crate::stats::StatsConfig;
use crate::types::{is_known_instrument, EngineError};

// ---------------------------------------------------------------------------
// Application configuration
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub gateway: GatewayConfig,
    /// Template applied to bots created without explicit parameters.
    #[serde(default)]
    pub bot_defaults: BotParams,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub listen_port: u16,
    /// Create and start a bot from `bot_defaults` on boot.
    #[serde(default)]
    pub autostart: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Env var holding the vendor gateway API token. Absent or unset
    /// means simulated execution only.
    #[serde(default)]
    pub api_token_env: Option<String>,
    /// Seed for the simulated feed/executor (reproducible runs).
    #[serde(default = "default_feed_seed")]
    pub feed_seed: u64,
    /// Decimal precision of quoted prices (drives last-digit extraction).
    #[serde(default = "default_tick_precision")]
    pub tick_precision: u32,
}

fn default_feed_seed() -> u64 {
    0
}

fn default_tick_precision() -> u32 {
    2
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve the gateway API token, if one is configured and set.
    pub fn resolve_api_token(&self) -> Option<SecretString> {
        self.gateway
            .api_token_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok())
            .map(SecretString::new)
    }
}

// ---------------------------------------------------------------------------
// Bot parameters
// ---------------------------------------------------------------------------

/// Full parameter set for one bot instance. Used both as the
/// `[bot_defaults]` config table and as the bot-creation request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotParams {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default = "default_instrument")]
    pub instrument: String,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
    /// Sleep between decision cycles.
    #[serde(default = "default_trade_interval_secs")]
    pub trade_interval_secs: u64,
    /// Trailing tick-window length requested from the feed.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Bounded wait for a fresh tick window.
    #[serde(default = "default_feed_timeout_secs")]
    pub feed_timeout_secs: u64,
    /// Bounded wait for a pending settlement.
    #[serde(default = "default_settle_timeout_secs")]
    pub settle_timeout_secs: u64,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub staking: StakingConfig,
    #[serde(default)]
    pub limits: RiskLimits,
}

fn default_bot_name() -> String {
    "volbot".to_string()
}

fn default_instrument() -> String {
    "R_100".to_string()
}

fn default_initial_balance() -> f64 {
    1000.0
}

fn default_trade_interval_secs() -> u64 {
    3
}

fn default_window_size() -> usize {
    100
}

fn default_feed_timeout_secs() -> u64 {
    5
}

fn default_settle_timeout_secs() -> u64 {
    30
}

impl Default for BotParams {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            instrument: default_instrument(),
            initial_balance: default_initial_balance(),
            trade_interval_secs: default_trade_interval_secs(),
            window_size: default_window_size(),
            feed_timeout_secs: default_feed_timeout_secs(),
            settle_timeout_secs: default_settle_timeout_secs(),
            stats: StatsConfig::default(),
            scorer: ScorerConfig::default(),
            staking: StakingConfig::default(),
            limits: RiskLimits::default(),
        }
    }
}

impl BotParams {
    /// Validate the whole parameter set. Runs once at bot creation.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Config("bot name must not be empty".into()));
        }
        if !is_known_instrument(&self.instrument) {
            return Err(EngineError::Config(format!(
                "unknown instrument: {}",
                self.instrument
            )));
        }
        if self.initial_balance <= 0.0 {
            return Err(EngineError::Config(format!(
                "initial_balance must be positive, got {}",
                self.initial_balance
            )));
        }
        if self.trade_interval_secs == 0 {
            return Err(EngineError::Config(
                "trade_interval_secs must be at least 1".into(),
            ));
        }
        if self.window_size < self.stats.min_samples {
            return Err(EngineError::Config(format!(
                "window_size ({}) must cover min_samples ({})",
                self.window_size, self.stats.min_samples
            )));
        }
        self.scorer.validate()?;
        self.staking.validate()?;
        self.limits.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
