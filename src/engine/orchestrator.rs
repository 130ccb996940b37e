//! Per-bot decision loop.
//!
//! One orchestrator owns one bot instance: it pulls the tick window,
//! computes statistics, selects a signal, sizes the stake through the
//! recovery controller, passes it through the risk gate, submits the
//! decision, and feeds the outcome back — then sleeps until the next
//! cycle. All mutation of the bot's state happens on this task; the
//! registry and API only ever read snapshots.
//!
//! Lifecycle: STARTING → ACTIVE → {STOPPED, ERROR}. Stopping is
//! cooperative via a watch flag, checked at the top of each cycle and
//! around every suspension point — no decision is submitted after a
//! stop request has been observed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio::sync::{watch, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BotParams;
use crate::gateway::{ExecutionGateway, MarketFeed, Submission, TradeStore};
use crate::risk::{RiskGate, RiskLimits};
use crate::signal::SignalScorer;
use crate::staking::RecoveryController;
use crate::stats::compute_statistics;
use crate::types::{BotRuntimeState, BotStatus, Decision, EngineError, StopReason};

use super::limiter::DecisionRateLimiter;

/// Pause after a data/execution hiccup before retrying.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Consecutive gateway/execution failures tolerated before the loop
/// gives up and parks the bot in ERROR.
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

pub struct BotOrchestrator {
    bot_id: Uuid,
    params: BotParams,
    scorer: SignalScorer,
    recovery: RecoveryController,
    limiter: DecisionRateLimiter,
    state: Arc<RwLock<BotRuntimeState>>,
    limits: Arc<RwLock<RiskLimits>>,
    feed: Arc<dyn MarketFeed>,
    executor: Arc<dyn ExecutionGateway>,
    store: Arc<dyn TradeStore>,
    stop_rx: watch::Receiver<bool>,
}

impl BotOrchestrator {
    /// Build an orchestrator for already-validated parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bot_id: Uuid,
        params: BotParams,
        state: Arc<RwLock<BotRuntimeState>>,
        limits: Arc<RwLock<RiskLimits>>,
        feed: Arc<dyn MarketFeed>,
        executor: Arc<dyn ExecutionGateway>,
        store: Arc<dyn TradeStore>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        let scorer = SignalScorer::new(params.scorer.clone());
        let recovery = RecoveryController::new(params.staking.clone());
        let limiter = DecisionRateLimiter::new(1); // cap refreshed each cycle
        Self {
            bot_id,
            params,
            scorer,
            recovery,
            limiter,
            state,
            limits,
            feed,
            executor,
            store,
            stop_rx,
        }
    }

    /// Run the decision loop until stopped, risk-denied, or errored out.
    pub async fn run(mut self) {
        {
            let mut state = self.state.write().await;
            state.status = BotStatus::Active;
            info!(
                bot_id = %self.bot_id,
                name = %state.name,
                instrument = %state.instrument,
                interval_secs = self.params.trade_interval_secs,
                "Bot active"
            );
        }

        let interval = Duration::from_secs(self.params.trade_interval_secs);
        let mut consecutive_failures = 0u32;

        loop {
            if self.stop_requested() {
                self.finish_manual().await;
                break;
            }

            match self.cycle().await {
                Ok(()) => {
                    consecutive_failures = 0;
                    if self.idle(interval).await {
                        self.finish_manual().await;
                        break;
                    }
                }
                Err(EngineError::InsufficientData { have, need }) => {
                    consecutive_failures = 0;
                    debug!(have, need, "Window too short, skipping cycle");
                    if self.idle(interval).await {
                        self.finish_manual().await;
                        break;
                    }
                }
                Err(EngineError::NoQualifyingSignal) => {
                    consecutive_failures = 0;
                    debug!("No qualifying signal, skipping cycle");
                    if self.idle(interval).await {
                        self.finish_manual().await;
                        break;
                    }
                }
                Err(EngineError::RiskDenied(reason)) => {
                    let mut state = self.state.write().await;
                    state.stop(reason);
                    if reason.is_success() {
                        info!(bot_id = %self.bot_id, reason = %reason, "Bot stopped: target reached");
                    } else {
                        warn!(bot_id = %self.bot_id, reason = %reason, "Bot stopped by risk gate");
                    }
                    break;
                }
                Err(EngineError::Execution(msg)) | Err(EngineError::Gateway(msg)) => {
                    consecutive_failures += 1;
                    warn!(
                        bot_id = %self.bot_id,
                        error = %msg,
                        failures = consecutive_failures,
                        "Cycle failed, backing off"
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        error!(bot_id = %self.bot_id, "Too many consecutive failures, parking bot");
                        self.state.write().await.status = BotStatus::Error;
                        break;
                    }
                    if self.idle(ERROR_BACKOFF).await {
                        self.finish_manual().await;
                        break;
                    }
                }
                Err(other) => {
                    // Creation-time errors cannot surface here.
                    error!(bot_id = %self.bot_id, error = %other, "Unexpected engine error");
                    self.state.write().await.status = BotStatus::Error;
                    break;
                }
            }
        }

        let state = self.state.read().await;
        info!(
            bot_id = %self.bot_id,
            status = %state.status,
            balance = format!("${:.2}", state.balance),
            trades = state.trades_placed,
            win_rate = format!("{:.1}%", state.win_rate()),
            "Decision loop finished"
        );
    }

    /// One decision cycle: window → statistics → signal → stake →
    /// risk gate → rate limit → submit → settle → record.
    async fn cycle(&mut self) -> Result<(), EngineError> {
        {
            let mut state = self.state.write().await;
            state.cycle_count += 1;
            state.roll_daily(Utc::now().date_naive());
        }

        // Limits snapshot for this cycle; updates apply between cycles.
        let limits = *self.limits.read().await;
        self.limiter.set_cap(limits.max_decisions_per_hour);

        // 1. Tick window (bounded wait; a timeout is a data gap, not a fault).
        let window = match timeout(
            Duration::from_secs(self.params.feed_timeout_secs),
            self.feed
                .recent_ticks(&self.params.instrument, self.params.window_size),
        )
        .await
        {
            Err(_) => {
                return Err(EngineError::InsufficientData {
                    have: 0,
                    need: self.params.stats.min_samples,
                })
            }
            Ok(Err(e)) => return Err(EngineError::Gateway(e.to_string())),
            Ok(Ok(window)) => window,
        };

        // 2. Statistics (pure; InsufficientData skips the cycle).
        let stats = compute_statistics(&window, &self.params.stats)?;

        // 3. Signal selection.
        let signal = self.scorer.best_signal(&self.params.instrument, &stats)?;

        // 4. Stake from the recovery controller.
        let proposed = self.recovery.next_stake();

        // 5. Risk gate.
        let snapshot = self.state.read().await.clone();
        let stake =
            RiskGate::authorize(proposed, &snapshot, &limits).map_err(EngineError::RiskDenied)?;

        // 6. Hourly rate cap: sleep out the remainder, never drop silently.
        while let Some(wait) = self.limiter.check(Instant::now()) {
            info!(
                bot_id = %self.bot_id,
                wait_secs = wait.as_secs(),
                "Hourly decision cap reached, waiting"
            );
            if self.idle(wait).await {
                return Ok(()); // stop observed while waiting
            }
        }
        if self.stop_requested() {
            return Ok(());
        }

        // 7. Submit.
        let decision = Decision::new(self.bot_id, signal, stake, self.recovery.state().step);
        info!(bot_id = %self.bot_id, decision = %decision, "Submitting decision");
        let submission = self
            .executor
            .submit(&decision)
            .await
            .map_err(|e| EngineError::Execution(e.to_string()))?;
        self.limiter.record(Instant::now());

        // 8. Settle (synchronous or pending).
        let outcome = match submission {
            Submission::Settled(outcome) => outcome,
            Submission::Pending(rx) => {
                timeout(Duration::from_secs(self.params.settle_timeout_secs), rx)
                    .await
                    .map_err(|_| EngineError::Execution("settlement timed out".into()))?
                    .map_err(|_| EngineError::Execution("settlement channel closed".into()))?
            }
        };

        // 9. Feed the outcome back.
        self.recovery.record_outcome(&outcome);
        {
            let mut state = self.state.write().await;
            state.apply_outcome(&outcome);
            state.recovery = self.recovery.state();
            info!(
                bot_id = %self.bot_id,
                outcome = %outcome,
                balance = format!("${:.2}", state.balance),
                daily = format!("${:+.2}", state.daily_pnl),
                step = state.recovery.step,
                "Decision settled"
            );
        }

        // 10. Durability hook — failures never abort the loop.
        if let Err(e) = self.store.record(&decision, &outcome).await {
            warn!(bot_id = %self.bot_id, error = %e, "Trade persistence failed, continuing");
        }

        Ok(())
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Interruptible sleep. Returns true when a stop was observed.
    async fn idle(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.stop_requested(),
            changed = self.stop_rx.changed() => {
                changed.map(|_| self.stop_requested()).unwrap_or(true)
            }
        }
    }

    async fn finish_manual(&self) {
        let mut state = self.state.write().await;
        if state.status == BotStatus::Active || state.status == BotStatus::Starting {
            state.stop(StopReason::Manual);
        }
        info!(bot_id = %self.bot_id, "Stop request honoured");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
