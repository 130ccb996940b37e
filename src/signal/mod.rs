//! Signal scoring.
//!
//! Converts digit statistics into scored trade candidates, one per
//! contract family/parameter combination, then applies the selection
//! policy: minimum-confidence filter, composite-score ranking with a
//! deterministic tie-break, and the optional explicit fallback.
//!
//! Signals are recomputed fresh every cycle — the scorer holds no state
//! between calls.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stats::DigitStatistics;
use crate::types::{EngineError, TradeDirection, TradeSignal};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How the family/direction to trade is chosen each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SelectionMode {
    /// Evaluate every family and take the best composite score.
    Auto,
    /// Evaluate only the configured direction against its own threshold.
    Fixed {
        direction: TradeDirection,
        #[serde(default)]
        barrier: Option<u8>,
    },
}

impl Default for SelectionMode {
    fn default() -> Self {
        SelectionMode::Auto
    }
}

/// Explicit always-trade fallback. When configured, a cycle with no
/// qualifying signal emits this direction at a floor confidence just
/// above the minimum instead of skipping. Never applied silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    pub direction: TradeDirection,
    #[serde(default)]
    pub barrier: Option<u8>,
}

/// Scorer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Signals below this confidence are dropped.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Upper bound on the streak/peakedness bonus.
    #[serde(default = "default_max_pattern_bonus")]
    pub max_pattern_bonus: f64,
    /// Over/under thresholds evaluated in auto mode.
    #[serde(default = "default_barriers")]
    pub over_under_barriers: Vec<u8>,
    #[serde(default)]
    pub selection: SelectionMode,
    #[serde(default)]
    pub fallback: Option<FallbackPolicy>,
}

fn default_min_confidence() -> f64 {
    55.0
}

fn default_max_pattern_bonus() -> f64 {
    20.0
}

fn default_barriers() -> Vec<u8> {
    vec![3, 4, 5, 6, 7]
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_pattern_bonus: default_max_pattern_bonus(),
            over_under_barriers: default_barriers(),
            selection: SelectionMode::default(),
            fallback: None,
        }
    }
}

impl ScorerConfig {
    /// Validate at bot-creation time; scoring never re-checks.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return Err(EngineError::Config(format!(
                "min_confidence must be within [0, 100], got {}",
                self.min_confidence
            )));
        }
        if self.max_pattern_bonus < 0.0 {
            return Err(EngineError::Config(format!(
                "max_pattern_bonus must be non-negative, got {}",
                self.max_pattern_bonus
            )));
        }
        if self.over_under_barriers.is_empty() {
            return Err(EngineError::Config(
                "over_under_barriers must not be empty".into(),
            ));
        }
        if let Some(b) = self.over_under_barriers.iter().find(|b| **b > 9) {
            return Err(EngineError::Config(format!(
                "over/under barrier must be a digit 0-9, got {b}"
            )));
        }
        if let SelectionMode::Fixed { direction, barrier } = &self.selection {
            if direction.needs_barrier() && barrier.is_none() {
                return Err(EngineError::Config(format!(
                    "fixed selection of {direction} requires a barrier digit"
                )));
            }
        }
        if let Some(fb) = &self.fallback {
            if fb.direction.needs_barrier() && fb.barrier.is_none() {
                return Err(EngineError::Config(format!(
                    "fallback to {} requires a barrier digit",
                    fb.direction
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct SignalScorer {
    config: ScorerConfig,
}

impl SignalScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Streak/peakedness bonus shared by all candidates of a cycle.
    ///
    /// Hot digits and long same-parity runs indicate a skewed window;
    /// few distinct digits indicate a peaked distribution. Capped at
    /// `max_pattern_bonus`.
    pub fn pattern_bonus(&self, stats: &DigitStatistics) -> f64 {
        let mut bonus = stats.hot_digits.len() as f64 * 3.0;
        if stats.parity_streak >= 3 {
            bonus += stats.parity_streak as f64 * 2.0;
        }
        if stats.distinct_digits <= 6 {
            bonus += 5.0;
        }
        bonus.min(self.config.max_pattern_bonus)
    }

    /// Base confidence for one direction, straight from the window
    /// statistic. The caller supplies the barrier for over/under and
    /// match/differ directions.
    pub fn confidence_for(
        &self,
        stats: &DigitStatistics,
        direction: TradeDirection,
        barrier: Option<u8>,
    ) -> f64 {
        let total = stats.total as f64;
        let pct_above = |b: u8| -> f64 {
            let c: u32 = (0u8..10)
                .filter(|d| *d > b)
                .map(|d| stats.counts[d as usize])
                .sum();
            c as f64 / total * 100.0
        };
        let pct_below = |b: u8| -> f64 {
            let c: u32 = (0u8..10)
                .filter(|d| *d < b)
                .map(|d| stats.counts[d as usize])
                .sum();
            c as f64 / total * 100.0
        };

        let raw = match direction {
            TradeDirection::Even => stats.even_pct,
            TradeDirection::Odd => stats.odd_pct,
            TradeDirection::Over => pct_above(barrier.unwrap_or(stats.split_digit)),
            TradeDirection::Under => pct_below(barrier.unwrap_or(stats.split_digit)),
            TradeDirection::Matches => stats.pct(barrier.unwrap_or(stats.most_frequent())),
            TradeDirection::Differs => 100.0 - stats.pct(barrier.unwrap_or(stats.most_frequent())),
        };
        raw.clamp(0.0, 100.0)
    }

    /// Score every candidate the configuration covers in auto mode:
    /// both parities, over/under at each barrier, match on hot digits,
    /// differ on cold digits. Sorted best-first with a deterministic
    /// tie-break (composite, then family index, then barrier).
    pub fn score_signals(&self, instrument: &str, stats: &DigitStatistics) -> Vec<TradeSignal> {
        let bonus = self.pattern_bonus(stats);
        let mut signals = Vec::new();

        signals.push(self.build(
            instrument,
            TradeDirection::Even,
            None,
            stats.even_pct,
            bonus,
            format!("Even digits at {:.1}% over {} ticks", stats.even_pct, stats.total),
        ));
        signals.push(self.build(
            instrument,
            TradeDirection::Odd,
            None,
            stats.odd_pct,
            bonus,
            format!("Odd digits at {:.1}% over {} ticks", stats.odd_pct, stats.total),
        ));

        for &b in &self.config.over_under_barriers {
            let over = self.confidence_for(stats, TradeDirection::Over, Some(b));
            let under = self.confidence_for(stats, TradeDirection::Under, Some(b));
            signals.push(self.build(
                instrument,
                TradeDirection::Over,
                Some(b),
                over,
                bonus,
                format!("Digits above {b} at {over:.1}% over {} ticks", stats.total),
            ));
            signals.push(self.build(
                instrument,
                TradeDirection::Under,
                Some(b),
                under,
                bonus,
                format!("Digits below {b} at {under:.1}% over {} ticks", stats.total),
            ));
        }

        for &d in &stats.hot_digits {
            let conf = stats.pct(d);
            signals.push(self.build(
                instrument,
                TradeDirection::Matches,
                Some(d),
                conf,
                bonus,
                format!("Digit {d} hot at {conf:.1}%"),
            ));
        }
        for &d in &stats.cold_digits {
            let conf = 100.0 - stats.pct(d);
            signals.push(self.build(
                instrument,
                TradeDirection::Differs,
                Some(d),
                conf,
                bonus,
                format!("Digit {d} cold at {:.1}%, expecting different", stats.pct(d)),
            ));
        }

        signals.sort_by(|a, b| {
            b.composite()
                .partial_cmp(&a.composite())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.family.index().cmp(&b.family.index()))
                .then(a.barrier.cmp(&b.barrier))
        });
        signals
    }

    /// Apply the full selection policy for one cycle.
    ///
    /// Returns `NoQualifyingSignal` when nothing clears the minimum
    /// confidence and no fallback is configured.
    pub fn best_signal(
        &self,
        instrument: &str,
        stats: &DigitStatistics,
    ) -> Result<TradeSignal, EngineError> {
        let selected = match &self.config.selection {
            SelectionMode::Auto => self
                .score_signals(instrument, stats)
                .into_iter()
                .find(|s| s.confidence >= self.config.min_confidence),
            SelectionMode::Fixed { direction, barrier } => {
                let conf = self.confidence_for(stats, *direction, *barrier);
                let bonus = self.pattern_bonus(stats);
                let signal = self.build(
                    instrument,
                    *direction,
                    *barrier,
                    conf,
                    bonus,
                    format!("{direction} at {conf:.1}% over {} ticks", stats.total),
                );
                (conf >= self.config.min_confidence).then_some(signal)
            }
        };

        if let Some(signal) = selected {
            debug!(signal = %signal, "Signal selected");
            return Ok(signal);
        }

        match &self.config.fallback {
            Some(fb) => {
                let floor = (self.config.min_confidence + 1.0).min(100.0);
                let signal = self.build(
                    instrument,
                    fb.direction,
                    fb.barrier,
                    floor,
                    0.0,
                    format!("Fallback {} at floor confidence", fb.direction),
                );
                debug!(signal = %signal, "No qualifying signal, using configured fallback");
                Ok(signal)
            }
            None => Err(EngineError::NoQualifyingSignal),
        }
    }

    fn build(
        &self,
        instrument: &str,
        direction: TradeDirection,
        barrier: Option<u8>,
        confidence: f64,
        pattern_bonus: f64,
        rationale: String,
    ) -> TradeSignal {
        TradeSignal {
            instrument: instrument.to_string(),
            family: direction.family(),
            direction,
            barrier,
            confidence: confidence.clamp(0.0, 100.0),
            pattern_bonus,
            rationale,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{compute_statistics, StatsConfig};
    use crate::types::{ContractFamily, TickSample};
    use chrono::Utc;

    fn stats_for(digits: &[u8]) -> DigitStatistics {
        let window: Vec<TickSample> = digits
            .iter()
            .map(|&d| TickSample::with_digit("R_100", d, Utc::now()))
            .collect();
        compute_statistics(&window, &StatsConfig::default()).unwrap()
    }

    fn scorer(config: ScorerConfig) -> SignalScorer {
        SignalScorer::new(config)
    }

    const ALL_EVEN: [u8; 20] = [2, 4, 6, 8, 0, 2, 4, 6, 8, 0, 2, 4, 6, 8, 0, 2, 4, 6, 8, 0];

    #[test]
    fn test_all_even_parity_confidence_100() {
        let stats = stats_for(&ALL_EVEN);
        let s = scorer(ScorerConfig::default());
        assert!((s.confidence_for(&stats, TradeDirection::Even, None) - 100.0).abs() < 0.01);
        assert!((s.confidence_for(&stats, TradeDirection::Odd, None) - 0.0).abs() < 0.01);
    }

    #[test]
    fn test_all_even_best_signal_is_parity() {
        // Parity and differ-cold both reach 100; the family tie-break
        // (Parity = 0) must pick the parity contract.
        let stats = stats_for(&ALL_EVEN);
        let s = scorer(ScorerConfig::default());
        let best = s.best_signal("R_100", &stats).unwrap();
        assert_eq!(best.family, ContractFamily::Parity);
        assert_eq!(best.direction, TradeDirection::Even);
        assert!((best.confidence - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_confidence_clamped_to_100() {
        let stats = stats_for(&ALL_EVEN);
        let s = scorer(ScorerConfig::default());
        for sig in s.score_signals("R_100", &stats) {
            assert!(sig.confidence <= 100.0);
            assert!(sig.confidence >= 0.0);
        }
    }

    #[test]
    fn test_over_under_confidence() {
        // 8 digits above 5, 2 below, none equal → over 80%, under 20%.
        let stats = stats_for(&[6, 7, 8, 9, 6, 7, 8, 9, 1, 2]);
        let s = scorer(ScorerConfig::default());
        assert!((s.confidence_for(&stats, TradeDirection::Over, Some(5)) - 80.0).abs() < 0.01);
        assert!((s.confidence_for(&stats, TradeDirection::Under, Some(5)) - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_pattern_bonus_capped() {
        // Heavily skewed window: many hot digits and a long streak.
        let stats = stats_for(&ALL_EVEN);
        let s = scorer(ScorerConfig::default());
        assert!((s.pattern_bonus(&stats) - 20.0).abs() < 1e-10);

        let uncapped = scorer(ScorerConfig {
            max_pattern_bonus: 100.0,
            ..ScorerConfig::default()
        });
        // 5 hot digits (15) + streak 20 (40) + peaked (5) = 60
        assert!((uncapped.pattern_bonus(&stats) - 60.0).abs() < 1e-10);
    }

    #[test]
    fn test_no_bonus_for_uniform_window() {
        let stats = stats_for(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let s = scorer(ScorerConfig::default());
        assert_eq!(s.pattern_bonus(&stats), 0.0);
    }

    #[test]
    fn test_no_qualifying_signal_without_fallback() {
        // Near-uniform window with a high minimum → nothing qualifies.
        let stats = stats_for(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let s = scorer(ScorerConfig {
            min_confidence: 95.0,
            ..ScorerConfig::default()
        });
        let err = s.best_signal("R_100", &stats).unwrap_err();
        assert!(matches!(err, EngineError::NoQualifyingSignal));
    }

    #[test]
    fn test_fallback_emits_floor_confidence() {
        let stats = stats_for(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let s = scorer(ScorerConfig {
            min_confidence: 95.0,
            fallback: Some(FallbackPolicy {
                direction: TradeDirection::Even,
                barrier: None,
            }),
            ..ScorerConfig::default()
        });
        let signal = s.best_signal("R_100", &stats).unwrap();
        assert_eq!(signal.direction, TradeDirection::Even);
        assert!((signal.confidence - 96.0).abs() < 1e-10);
    }

    #[test]
    fn test_fixed_mode_evaluates_only_configured_direction() {
        // Window skews odd, but the bot is pinned to UNDER 5.
        let stats = stats_for(&[1, 1, 3, 3, 5, 7, 9, 1, 3, 9]);
        let s = scorer(ScorerConfig {
            min_confidence: 50.0,
            selection: SelectionMode::Fixed {
                direction: TradeDirection::Under,
                barrier: Some(5),
            },
            ..ScorerConfig::default()
        });
        let signal = s.best_signal("R_100", &stats).unwrap();
        assert_eq!(signal.direction, TradeDirection::Under);
        assert_eq!(signal.barrier, Some(5));
        // 6 of 10 digits below 5 → 60%
        assert!((signal.confidence - 60.0).abs() < 0.01);
    }

    #[test]
    fn test_fixed_mode_below_threshold_skips() {
        let stats = stats_for(&[6, 7, 8, 9, 6, 7, 8, 9, 6, 7]);
        let s = scorer(ScorerConfig {
            min_confidence: 55.0,
            selection: SelectionMode::Fixed {
                direction: TradeDirection::Under,
                barrier: Some(5),
            },
            ..ScorerConfig::default()
        });
        assert!(matches!(
            s.best_signal("R_100", &stats),
            Err(EngineError::NoQualifyingSignal)
        ));
    }

    #[test]
    fn test_signals_sorted_by_composite() {
        let stats = stats_for(&[6, 7, 8, 9, 6, 7, 8, 9, 1, 2]);
        let s = scorer(ScorerConfig::default());
        let signals = s.score_signals("R_100", &stats);
        for pair in signals.windows(2) {
            assert!(pair[0].composite() >= pair[1].composite());
        }
    }

    #[test]
    fn test_differ_on_cold_digit_high_confidence() {
        // Digit 9 never appears in the window → differ confidence 100.
        let stats = stats_for(&[0, 0, 1, 1, 2, 2, 3, 3, 4, 4]);
        let s = scorer(ScorerConfig::default());
        let signals = s.score_signals("R_100", &stats);
        let differ9 = signals
            .iter()
            .find(|s| s.direction == TradeDirection::Differs && s.barrier == Some(9))
            .expect("differ signal for absent digit");
        assert!((differ9.confidence - 100.0).abs() < 0.01);
    }

    // -- Config validation --

    #[test]
    fn test_validate_default_ok() {
        assert!(ScorerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_min_confidence() {
        let cfg = ScorerConfig {
            min_confidence: 120.0,
            ..ScorerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_barrier_out_of_range() {
        let cfg = ScorerConfig {
            over_under_barriers: vec![5, 12],
            ..ScorerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_validate_fixed_needs_barrier() {
        let cfg = ScorerConfig {
            selection: SelectionMode::Fixed {
                direction: TradeDirection::Over,
                barrier: None,
            },
            ..ScorerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_validate_fallback_needs_barrier() {
        let cfg = ScorerConfig {
            fallback: Some(FallbackPolicy {
                direction: TradeDirection::Matches,
                barrier: None,
            }),
            ..ScorerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }
}
