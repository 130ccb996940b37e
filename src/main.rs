//! VOLBOT — Autonomous digit-contract trading engine.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the gateway and registry, serves the control API, and runs
//! until a shutdown signal — stopping every bot cooperatively on the
//! way out.

use anyhow::Result;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{info, warn};

use volbot::api;
use volbot::config::AppConfig;
use volbot::engine::registry::BotRegistry;
use volbot::gateway::simulated::{SimulatedExecutor, SimulatedFeed};
use volbot::storage::TradeLog;

const BANNER: &str = r#"
__     ______  _     ____   ___ _____
\ \   / / __ \| |   |  _ \ / _ \_   _|
 \ \ / / |  | | |   | |_) | | | || |
  \ V /| |__| | |___|  _ <| |_| || |
   \_/  \____/|_____|_| \_\\___/ |_|

  Volatility-Index Digit Trading Engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        service = %cfg.service.name,
        port = cfg.service.listen_port,
        "VOLBOT starting up"
    );

    // -- Gateway ----------------------------------------------------------

    // A live vendor gateway authenticates with the configured token;
    // until one is wired in, every run uses the simulated backend.
    match cfg.resolve_api_token() {
        Some(token) => {
            warn!(
                token_chars = token.expose_secret().len(),
                "Gateway token resolved, but live execution is not wired: using simulated backend"
            );
        }
        None => {
            info!("No gateway token configured, using simulated backend");
        }
    }

    let feed = Arc::new(SimulatedFeed::new(cfg.gateway.feed_seed).with_precision(cfg.gateway.tick_precision));
    let executor = Arc::new(SimulatedExecutor::new(cfg.gateway.feed_seed));
    let store = Arc::new(TradeLog::new(None));
    info!(trade_log = %store.path().display(), "Trade history log ready");

    // -- Registry & API ---------------------------------------------------

    let registry = Arc::new(BotRegistry::new(feed, executor, store));
    api::spawn_server(registry.clone(), cfg.service.listen_port);

    if cfg.service.autostart {
        let params = cfg.bot_defaults.clone();
        info!(
            name = %params.name,
            instrument = %params.instrument,
            "Autostarting default bot"
        );
        let bot_id = registry.create(params).await?;
        registry.start(bot_id).await?;
    }

    // -- Shutdown ---------------------------------------------------------

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping bots");
    registry.stop_all().await;

    for state in registry.list().await {
        info!(bot = %state, "Final state");
    }

    info!("VOLBOT shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("volbot=info"));

    let json_logging = std::env::var("VOLBOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
