//! Shared types for the VOLBOT engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that the statistics, signal,
//! staking, risk, and engine modules can depend on them without
//! circular references.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Instruments
// ---------------------------------------------------------------------------

/// Volatility indices available for trading: (symbol, display name).
pub const KNOWN_INSTRUMENTS: &[(&str, &str)] = &[
    ("R_10", "Volatility 10 Index"),
    ("R_25", "Volatility 25 Index"),
    ("R_50", "Volatility 50 Index"),
    ("R_75", "Volatility 75 Index"),
    ("R_100", "Volatility 100 Index"),
    ("1HZ10V", "Volatility 10 (1s) Index"),
    ("1HZ25V", "Volatility 25 (1s) Index"),
    ("1HZ50V", "Volatility 50 (1s) Index"),
    ("1HZ75V", "Volatility 75 (1s) Index"),
    ("1HZ100V", "Volatility 100 (1s) Index"),
];

/// Whether a symbol is one of the known volatility indices.
pub fn is_known_instrument(symbol: &str) -> bool {
    KNOWN_INSTRUMENTS.iter().any(|(s, _)| *s == symbol)
}

// ---------------------------------------------------------------------------
// Ticks
// ---------------------------------------------------------------------------

/// One price update for an instrument. Immutable once created.
///
/// The last significant digit of the quoted price is the unit being
/// statistically analysed — everything downstream keys off `last_digit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSample {
    pub instrument: String,
    pub price: f64,
    pub epoch: DateTime<Utc>,
    /// Last significant digit of the quoted price (0–9).
    pub last_digit: u8,
}

impl TickSample {
    /// Build a sample from a raw price, deriving the last digit from the
    /// quoted precision (number of decimal places the feed publishes).
    pub fn from_price(instrument: &str, price: f64, epoch: DateTime<Utc>, precision: u32) -> Self {
        let scaled = (price.abs() * 10f64.powi(precision as i32)).round() as i64;
        Self {
            instrument: instrument.to_string(),
            price,
            epoch,
            last_digit: (scaled % 10) as u8,
        }
    }

    /// Build a sample with a known digit (used by tests and replay fixtures).
    pub fn with_digit(instrument: &str, digit: u8, epoch: DateTime<Utc>) -> Self {
        debug_assert!(digit <= 9);
        Self {
            instrument: instrument.to_string(),
            price: 100.0 + digit as f64 / 100.0,
            epoch,
            last_digit: digit,
        }
    }
}

impl fmt::Display for TickSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.5} (digit {}) @ {}",
            self.instrument,
            self.price,
            self.last_digit,
            self.epoch.format("%H:%M:%S"),
        )
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// A trade category. The ordering of the variants is the deterministic
/// tie-break when two signals carry the same composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractFamily {
    Parity,
    OverUnder,
    DigitMatch,
}

impl ContractFamily {
    /// Stable index used for tie-breaking (lower wins).
    pub fn index(&self) -> u8 {
        match self {
            ContractFamily::Parity => 0,
            ContractFamily::OverUnder => 1,
            ContractFamily::DigitMatch => 2,
        }
    }
}

impl fmt::Display for ContractFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractFamily::Parity => write!(f, "EVEN_ODD"),
            ContractFamily::OverUnder => write!(f, "OVER_UNDER"),
            ContractFamily::DigitMatch => write!(f, "MATCH_DIFFER"),
        }
    }
}

/// Direction within a contract family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Even,
    Odd,
    Over,
    Under,
    Matches,
    Differs,
}

impl TradeDirection {
    /// The family this direction belongs to.
    pub fn family(&self) -> ContractFamily {
        match self {
            TradeDirection::Even | TradeDirection::Odd => ContractFamily::Parity,
            TradeDirection::Over | TradeDirection::Under => ContractFamily::OverUnder,
            TradeDirection::Matches | TradeDirection::Differs => ContractFamily::DigitMatch,
        }
    }

    /// Whether this direction requires a target digit/threshold.
    pub fn needs_barrier(&self) -> bool {
        !matches!(self, TradeDirection::Even | TradeDirection::Odd)
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::Even => write!(f, "EVEN"),
            TradeDirection::Odd => write!(f, "ODD"),
            TradeDirection::Over => write!(f, "OVER"),
            TradeDirection::Under => write!(f, "UNDER"),
            TradeDirection::Matches => write!(f, "MATCHES"),
            TradeDirection::Differs => write!(f, "DIFFERS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Signals & decisions
// ---------------------------------------------------------------------------

/// A scored trade candidate for one contract family/parameter combination.
/// Immutable; the scorer produces a fresh set every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub instrument: String,
    pub family: ContractFamily,
    pub direction: TradeDirection,
    /// Target digit (match/differ) or threshold (over/under).
    pub barrier: Option<u8>,
    /// Base confidence in [0, 100], derived from the window statistic.
    pub confidence: f64,
    /// Streak/peakedness bonus, capped by the scorer configuration.
    pub pattern_bonus: f64,
    /// Human-readable justification for the signal.
    pub rationale: String,
}

impl TradeSignal {
    /// Composite score used for cross-family selection.
    pub fn composite(&self) -> f64 {
        self.confidence + self.pattern_bonus
    }
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.instrument, self.family, self.direction)?;
        if let Some(b) = self.barrier {
            write!(f, "({b})")?;
        }
        write!(
            f,
            " conf={:.1}% score={:.1}",
            self.confidence,
            self.composite(),
        )
    }
}

/// A decision produced once per cycle and sent to the execution gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub signal: TradeSignal,
    pub stake: f64,
    /// Recovery depth at submission time (0 = base stake).
    pub recovery_step: u32,
    pub placed_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(bot_id: Uuid, signal: TradeSignal, stake: f64, recovery_step: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            bot_id,
            signal,
            stake,
            recovery_step,
            placed_at: Utc::now(),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stake=${:.2} step={}",
            self.signal, self.stake, self.recovery_step,
        )
    }
}

/// Settlement result of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResult {
    Win,
    Loss,
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeResult::Win => write!(f, "WIN"),
            TradeResult::Loss => write!(f, "LOSS"),
        }
    }
}

/// Outcome paired with a decision once the contract settles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub result: TradeResult,
    /// Realised profit (positive) or loss (negative).
    pub profit: f64,
    pub settled_at: DateTime<Utc>,
}

impl Outcome {
    pub fn is_win(&self) -> bool {
        self.result == TradeResult::Win
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} P&L=${:+.2}", self.result, self.profit)
    }
}

/// Flattened decision + outcome row, persisted to the trade log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub instrument: String,
    pub family: ContractFamily,
    pub direction: TradeDirection,
    pub barrier: Option<u8>,
    pub confidence: f64,
    pub stake: f64,
    pub recovery_step: u32,
    pub result: TradeResult,
    pub profit: f64,
    pub placed_at: DateTime<Utc>,
    pub settled_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn from_settlement(decision: &Decision, outcome: &Outcome) -> Self {
        Self {
            id: decision.id,
            bot_id: decision.bot_id,
            instrument: decision.signal.instrument.clone(),
            family: decision.signal.family,
            direction: decision.signal.direction,
            barrier: decision.signal.barrier,
            confidence: decision.signal.confidence,
            stake: decision.stake,
            recovery_step: decision.recovery_step,
            result: outcome.result,
            profit: outcome.profit,
            placed_at: decision.placed_at,
            settled_at: outcome.settled_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Bot lifecycle
// ---------------------------------------------------------------------------

/// Decision-loop lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotStatus {
    Starting,
    Active,
    Stopped,
    Error,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotStatus::Starting => write!(f, "STARTING"),
            BotStatus::Active => write!(f, "ACTIVE"),
            BotStatus::Stopped => write!(f, "STOPPED"),
            BotStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Why a bot stopped. `TakeProfit` is a successful stop, not a failure —
/// the status surface distinguishes it from the loss-driven reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    DailyLossLimit,
    BalanceFloor,
    TakeProfit,
    StopLoss,
    Manual,
}

impl StopReason {
    /// Whether this stop is a success condition (target reached).
    pub fn is_success(&self) -> bool {
        matches!(self, StopReason::TakeProfit)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::DailyLossLimit => write!(f, "daily loss limit reached"),
            StopReason::BalanceFloor => write!(f, "balance below floor"),
            StopReason::TakeProfit => write!(f, "take profit reached"),
            StopReason::StopLoss => write!(f, "stop loss reached"),
            StopReason::Manual => write!(f, "stopped by operator"),
        }
    }
}

/// Recovery staking snapshot, embedded in the runtime state so the
/// status surface can report martingale depth without reaching into the
/// orchestrator task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RecoveryState {
    /// Current recovery step (0 = base stake, no recovery).
    pub step: u32,
    /// Losses absorbed at the current step before advancing.
    pub repeat_count: u32,
    /// Total unrecovered loss accumulated across the sequence.
    pub accumulated_loss: f64,
    pub in_recovery: bool,
}

/// Aggregate runtime state of one bot instance. Owned exclusively by its
/// orchestrator task; the registry/API only take read snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotRuntimeState {
    pub bot_id: Uuid,
    pub name: String,
    pub instrument: String,
    pub status: BotStatus,
    pub stop_reason: Option<StopReason>,
    pub balance: f64,
    pub initial_balance: f64,
    /// Cumulative profit/loss since the last UTC-day rollover.
    pub daily_pnl: f64,
    pub daily_date: NaiveDate,
    pub trades_placed: u64,
    pub trades_won: u64,
    pub trades_lost: u64,
    pub current_streak: u64,
    pub best_streak: u64,
    pub cycle_count: u64,
    pub recovery: RecoveryState,
    pub started_at: DateTime<Utc>,
    pub last_decision_at: Option<DateTime<Utc>>,
}

impl BotRuntimeState {
    pub fn new(bot_id: Uuid, name: &str, instrument: &str, initial_balance: f64) -> Self {
        Self {
            bot_id,
            name: name.to_string(),
            instrument: instrument.to_string(),
            status: BotStatus::Starting,
            stop_reason: None,
            balance: initial_balance,
            initial_balance,
            daily_pnl: 0.0,
            daily_date: Utc::now().date_naive(),
            trades_placed: 0,
            trades_won: 0,
            trades_lost: 0,
            current_streak: 0,
            best_streak: 0,
            cycle_count: 0,
            recovery: RecoveryState::default(),
            started_at: Utc::now(),
            last_decision_at: None,
        }
    }

    /// Win rate as a percentage. Returns 0.0 if nothing has settled.
    pub fn win_rate(&self) -> f64 {
        let resolved = self.trades_won + self.trades_lost;
        if resolved == 0 {
            0.0
        } else {
            (self.trades_won as f64 / resolved as f64) * 100.0
        }
    }

    /// Today's cumulative loss as a positive number (0 when in profit).
    pub fn daily_loss(&self) -> f64 {
        (-self.daily_pnl).max(0.0)
    }

    /// Realised trades per hour since the bot started.
    pub fn trades_per_hour(&self) -> f64 {
        let hours = (Utc::now() - self.started_at).num_seconds() as f64 / 3600.0;
        self.trades_placed as f64 / hours.max(0.01)
    }

    pub fn is_active(&self) -> bool {
        self.status == BotStatus::Active
    }

    /// Reset daily counters when the UTC date has rolled over.
    pub fn roll_daily(&mut self, today: NaiveDate) {
        if today != self.daily_date {
            self.daily_pnl = 0.0;
            self.daily_date = today;
        }
    }

    /// Apply a settled outcome: balance, daily P&L, counters, streaks.
    pub fn apply_outcome(&mut self, outcome: &Outcome) {
        self.balance += outcome.profit;
        self.daily_pnl += outcome.profit;
        self.trades_placed += 1;
        if outcome.is_win() {
            self.trades_won += 1;
            self.current_streak += 1;
            self.best_streak = self.best_streak.max(self.current_streak);
        } else {
            self.trades_lost += 1;
            self.current_streak = 0;
        }
        self.last_decision_at = Some(outcome.settled_at);
    }

    /// Mark the bot stopped with the given reason.
    pub fn stop(&mut self, reason: StopReason) {
        self.status = BotStatus::Stopped;
        self.stop_reason = Some(reason);
    }
}

impl fmt::Display for BotRuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} | balance=${:.2} daily=${:+.2} | trades={} (W{}/L{}) win_rate={:.1}% | step={}",
            self.name,
            self.instrument,
            self.status,
            self.balance,
            self.daily_pnl,
            self.trades_placed,
            self.trades_won,
            self.trades_lost,
            self.win_rate(),
            self.recovery.step,
        )
    }
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Domain-specific error types for the engine.
///
/// `InsufficientData` and `NoQualifyingSignal` are recoverable skip-cycle
/// conditions; `RiskDenied` ends the session (not the process);
/// `Execution` is retried with backoff; `Config` only ever surfaces at
/// bot-creation time.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Insufficient tick data: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("No signal cleared the minimum confidence")]
    NoQualifyingSignal,

    #[error("Risk gate denied trading: {0}")]
    RiskDenied(StopReason),

    #[error("Execution failure: {0}")]
    Execution(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Bot not found: {0}")]
    BotNotFound(Uuid),

    #[error("Bot is already running: {0}")]
    AlreadyRunning(Uuid),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
