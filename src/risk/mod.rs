//! Risk gate.
//!
//! Account-level guardrails evaluated before every submission: daily
//! loss limit, balance floor, take-profit, stop-loss, and the per-trade
//! stake cap. The gate can veto trading entirely (the bot stops) or
//! reduce a proposed stake to fit the per-trade cap.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{BotRuntimeState, EngineError, StopReason};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Account-level risk limits. Read-only for the lifetime of a cycle;
/// the registry may swap them between cycles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Trading halts when balance falls below this fraction of the
    /// initial balance.
    #[serde(default = "default_balance_floor_frac")]
    pub balance_floor_frac: f64,
    /// Largest single trade as a fraction of the current balance.
    #[serde(default = "default_max_trade_frac")]
    pub max_trade_frac: f64,
    /// Daily cumulative loss limit as a fraction of the current balance.
    #[serde(default = "default_max_daily_loss_frac")]
    pub max_daily_loss_frac: f64,
    /// Absolute daily profit target; reaching it is a successful stop.
    #[serde(default = "default_take_profit")]
    pub take_profit: f64,
    /// Absolute daily loss cutoff.
    #[serde(default = "default_stop_loss")]
    pub stop_loss: f64,
    /// Rolling-hour cap on submitted decisions.
    #[serde(default = "default_max_decisions_per_hour")]
    pub max_decisions_per_hour: u32,
}

fn default_balance_floor_frac() -> f64 {
    0.2
}

fn default_max_trade_frac() -> f64 {
    0.1
}

fn default_max_daily_loss_frac() -> f64 {
    0.1
}

fn default_take_profit() -> f64 {
    500.0
}

fn default_stop_loss() -> f64 {
    200.0
}

fn default_max_decisions_per_hour() -> u32 {
    120
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            balance_floor_frac: default_balance_floor_frac(),
            max_trade_frac: default_max_trade_frac(),
            max_daily_loss_frac: default_max_daily_loss_frac(),
            take_profit: default_take_profit(),
            stop_loss: default_stop_loss(),
            max_decisions_per_hour: default_max_decisions_per_hour(),
        }
    }
}

impl RiskLimits {
    /// Validate at bot-creation time.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, frac) in [
            ("balance_floor_frac", self.balance_floor_frac),
            ("max_trade_frac", self.max_trade_frac),
            ("max_daily_loss_frac", self.max_daily_loss_frac),
        ] {
            if !(0.0..=1.0).contains(&frac) {
                return Err(EngineError::Config(format!(
                    "{name} must be within [0, 1], got {frac}"
                )));
            }
        }
        if self.take_profit <= 0.0 {
            return Err(EngineError::Config(format!(
                "take_profit must be positive, got {}",
                self.take_profit
            )));
        }
        if self.stop_loss <= 0.0 {
            return Err(EngineError::Config(format!(
                "stop_loss must be positive, got {}",
                self.stop_loss
            )));
        }
        if self.max_decisions_per_hour == 0 {
            return Err(EngineError::Config(
                "max_decisions_per_hour must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Partial risk-limit update, applied between cycles via the registry.
/// Unset fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiskLimitsPatch {
    pub balance_floor_frac: Option<f64>,
    pub max_trade_frac: Option<f64>,
    pub max_daily_loss_frac: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub max_decisions_per_hour: Option<u32>,
}

impl RiskLimitsPatch {
    /// Merge into existing limits, returning the validated result.
    pub fn apply(&self, current: &RiskLimits) -> Result<RiskLimits, EngineError> {
        let merged = RiskLimits {
            balance_floor_frac: self.balance_floor_frac.unwrap_or(current.balance_floor_frac),
            max_trade_frac: self.max_trade_frac.unwrap_or(current.max_trade_frac),
            max_daily_loss_frac: self
                .max_daily_loss_frac
                .unwrap_or(current.max_daily_loss_frac),
            take_profit: self.take_profit.unwrap_or(current.take_profit),
            stop_loss: self.stop_loss.unwrap_or(current.stop_loss),
            max_decisions_per_hour: self
                .max_decisions_per_hour
                .unwrap_or(current.max_decisions_per_hour),
        };
        merged.validate()?;
        Ok(merged)
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

pub struct RiskGate;

impl RiskGate {
    /// Authorize a proposed stake against the account guardrails.
    ///
    /// Checks run in a fixed order; the first violated guardrail wins.
    /// On success the stake comes back clamped to the per-trade cap.
    /// A `TakeProfit` denial is a success condition — the caller stops
    /// the bot but reports it as a target reached, not a failure.
    pub fn authorize(
        proposed_stake: f64,
        state: &BotRuntimeState,
        limits: &RiskLimits,
    ) -> Result<f64, StopReason> {
        if state.daily_loss() >= limits.max_daily_loss_frac * state.balance {
            return Err(StopReason::DailyLossLimit);
        }
        if state.balance < limits.balance_floor_frac * state.initial_balance {
            return Err(StopReason::BalanceFloor);
        }
        if state.daily_pnl >= limits.take_profit {
            return Err(StopReason::TakeProfit);
        }
        if state.daily_loss() >= limits.stop_loss {
            return Err(StopReason::StopLoss);
        }

        let cap = limits.max_trade_frac * state.balance;
        let allowed = proposed_stake.min(cap).max(0.0);
        if allowed < proposed_stake {
            debug!(
                proposed = format!("${proposed_stake:.2}"),
                allowed = format!("${allowed:.2}"),
                "Stake clamped to per-trade cap"
            );
        }
        Ok(allowed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
