//! Recovery staking (martingale) controller.
//!
//! A small state machine over `{step, repeat_count}` that sizes the next
//! stake from the outcome of the immediately preceding decision. A win
//! at any depth resets to the base stake; losses either repeat the
//! current step, advance it, or — once both step and repeat budgets are
//! exhausted — force a reset that abandons the unrecovered amount. The
//! forced reset is an explicit policy choice, surfaced in the logs.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{EngineError, Outcome, RecoveryState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Staking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Stake at step 0.
    #[serde(default = "default_base_stake")]
    pub base_stake: f64,
    /// Stake multiplier applied per recovery step.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Highest step the sequence may reach.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Losses tolerated per step before advancing.
    #[serde(default = "default_max_repeats")]
    pub max_repeats: u32,
    /// Safety ceiling as a multiple of the base stake. Bounds the
    /// worst-case single trade no matter how deep recovery goes.
    #[serde(default = "default_ceiling_factor")]
    pub ceiling_factor: f64,
}

fn default_base_stake() -> f64 {
    10.0
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_steps() -> u32 {
    5
}

fn default_max_repeats() -> u32 {
    1
}

fn default_ceiling_factor() -> f64 {
    50.0
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            base_stake: default_base_stake(),
            multiplier: default_multiplier(),
            max_steps: default_max_steps(),
            max_repeats: default_max_repeats(),
            ceiling_factor: default_ceiling_factor(),
        }
    }
}

impl StakingConfig {
    /// Validate at bot-creation time.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.base_stake <= 0.0 {
            return Err(EngineError::Config(format!(
                "base_stake must be positive, got {}",
                self.base_stake
            )));
        }
        if self.multiplier <= 1.0 {
            return Err(EngineError::Config(format!(
                "multiplier must be greater than 1, got {}",
                self.multiplier
            )));
        }
        if self.max_repeats < 1 {
            return Err(EngineError::Config(format!(
                "max_repeats must be at least 1, got {}",
                self.max_repeats
            )));
        }
        if self.ceiling_factor < 1.0 {
            return Err(EngineError::Config(format!(
                "ceiling_factor must be at least 1, got {}",
                self.ceiling_factor
            )));
        }
        Ok(())
    }

    /// Absolute stake ceiling in currency units.
    pub fn ceiling(&self) -> f64 {
        self.base_stake * self.ceiling_factor
    }

    /// Stake at a given recovery step: `base × multiplier^step`, capped
    /// at the safety ceiling even when the exponent arithmetic would
    /// exceed it.
    pub fn stake_at(&self, step: u32) -> f64 {
        if step == 0 {
            return self.base_stake;
        }
        let raw = self.base_stake * self.multiplier.powi(step as i32);
        raw.min(self.ceiling())
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Per-bot recovery controller. Mutated only by the outcome of the
/// immediately preceding decision, on the orchestrator's own task.
pub struct RecoveryController {
    config: StakingConfig,
    state: RecoveryState,
}

impl RecoveryController {
    pub fn new(config: StakingConfig) -> Self {
        Self {
            config,
            state: RecoveryState::default(),
        }
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    /// Snapshot of the current recovery state.
    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Stake for the next decision, sized from the current step.
    pub fn next_stake(&self) -> f64 {
        self.config.stake_at(self.state.step)
    }

    /// Advance the state machine with a settled outcome.
    pub fn record_outcome(&mut self, outcome: &Outcome) {
        if outcome.is_win() {
            if self.state.in_recovery {
                debug!(
                    step = self.state.step,
                    recovered = format!("${:.2}", self.state.accumulated_loss),
                    "Recovery sequence closed by win"
                );
            }
            self.state = RecoveryState::default();
            return;
        }

        self.state.accumulated_loss += outcome.profit.abs();

        if self.state.repeat_count + 1 < self.config.max_repeats {
            // Retry the current step.
            self.state.repeat_count += 1;
            self.state.in_recovery = true;
        } else if self.state.step < self.config.max_steps {
            self.state.step += 1;
            self.state.repeat_count = 0;
            self.state.in_recovery = true;
            debug!(
                step = self.state.step,
                next_stake = format!("${:.2}", self.next_stake()),
                "Recovery step advanced"
            );
        } else {
            // Step and repeat budgets exhausted: abandon the sequence.
            warn!(
                max_steps = self.config.max_steps,
                abandoned = format!("${:.2}", self.state.accumulated_loss),
                "Recovery exhausted, resetting to base stake"
            );
            self.state = RecoveryState::default();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
