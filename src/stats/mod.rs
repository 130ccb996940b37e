//! Digit statistics aggregation.
//!
//! Turns a bounded window of tick samples into frequency, streak, and
//! deviation statistics for one instrument. `compute_statistics` is a
//! pure function of the window and configuration — same inputs, same
//! output, bit for bit — so unit tests can assert against literal
//! fixtures.

use serde::{Deserialize, Serialize};

use crate::types::{EngineError, TickSample};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Aggregator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Minimum window length. Shorter windows yield `InsufficientData`
    /// and the caller treats the cycle as a no-op.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Split point for the over/under tally: over = digit > split,
    /// under = digit < split, equal = digit == split.
    #[serde(default = "default_split_digit")]
    pub split_digit: u8,
    /// Deviation margin (percentage points above/below the uniform 10%)
    /// for a digit to count as hot/cold.
    #[serde(default = "default_hot_cold_margin")]
    pub hot_cold_margin: f64,
}

fn default_min_samples() -> usize {
    10
}

fn default_split_digit() -> u8 {
    5
}

fn default_hot_cold_margin() -> f64 {
    3.0
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            split_digit: default_split_digit(),
            hot_cold_margin: default_hot_cold_margin(),
        }
    }
}

// ---------------------------------------------------------------------------
// DigitStatistics
// ---------------------------------------------------------------------------

/// Frequency/streak/deviation statistics over one tick window.
///
/// Invariants (within floating tolerance): the ten digit percentages sum
/// to 100; even% + odd% = 100; over% + under% + equal% = 100. Instances
/// are replaced wholesale on recomputation, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigitStatistics {
    /// Window length the statistics were computed over.
    pub total: usize,
    /// Occurrences of each digit 0–9.
    pub counts: [u32; 10],
    /// Percentage of the window taken by each digit.
    pub percentages: [f64; 10],
    pub even_count: u32,
    pub odd_count: u32,
    pub even_pct: f64,
    pub odd_pct: f64,
    /// The split digit the over/under tallies were computed against.
    pub split_digit: u8,
    pub over_count: u32,
    pub under_count: u32,
    pub equal_count: u32,
    pub over_pct: f64,
    pub under_pct: f64,
    pub equal_pct: f64,
    /// Deviation of each digit's percentage from the uniform 10%.
    pub deviations: [f64; 10],
    /// Digits whose deviation exceeds the hot/cold margin.
    pub hot_digits: Vec<u8>,
    /// Digits whose deviation falls below the negative margin.
    pub cold_digits: Vec<u8>,
    /// Length of the trailing run of same-parity digits.
    pub parity_streak: usize,
    /// Number of distinct digits appearing in the window.
    pub distinct_digits: usize,
}

impl DigitStatistics {
    /// Percentage of the window taken by `digit`.
    pub fn pct(&self, digit: u8) -> f64 {
        self.percentages[digit as usize]
    }

    /// The most frequent digit (lowest digit wins ties).
    pub fn most_frequent(&self) -> u8 {
        let mut best = 0u8;
        for d in 1..10 {
            if self.counts[d] > self.counts[best as usize] {
                best = d as u8;
            }
        }
        best
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Compute digit statistics over an ordered window (most-recent-last).
///
/// Returns `InsufficientData` when the window is shorter than the
/// configured minimum — including the empty window, so no division by
/// zero is reachable downstream.
pub fn compute_statistics(
    window: &[TickSample],
    cfg: &StatsConfig,
) -> Result<DigitStatistics, EngineError> {
    if window.len() < cfg.min_samples {
        return Err(EngineError::InsufficientData {
            have: window.len(),
            need: cfg.min_samples,
        });
    }

    let total = window.len();
    let total_f = total as f64;

    let mut counts = [0u32; 10];
    for tick in window {
        counts[tick.last_digit as usize] += 1;
    }

    let mut percentages = [0.0f64; 10];
    let mut deviations = [0.0f64; 10];
    let mut hot_digits = Vec::new();
    let mut cold_digits = Vec::new();
    let mut distinct_digits = 0usize;

    for d in 0..10 {
        let pct = counts[d] as f64 / total_f * 100.0;
        percentages[d] = pct;
        deviations[d] = pct - 10.0;
        if counts[d] > 0 {
            distinct_digits += 1;
        }
        if deviations[d] > cfg.hot_cold_margin {
            hot_digits.push(d as u8);
        } else if deviations[d] < -cfg.hot_cold_margin {
            cold_digits.push(d as u8);
        }
    }

    let even_count: u32 = (0..10).step_by(2).map(|d| counts[d]).sum();
    let odd_count = total as u32 - even_count;
    let even_pct = even_count as f64 / total_f * 100.0;
    let odd_pct = odd_count as f64 / total_f * 100.0;

    let split = cfg.split_digit;
    let over_count: u32 = counts
        .iter()
        .enumerate()
        .filter(|(d, _)| *d as u8 > split)
        .map(|(_, c)| *c)
        .sum();
    let under_count: u32 = counts
        .iter()
        .enumerate()
        .filter(|(d, _)| (*d as u8) < split)
        .map(|(_, c)| *c)
        .sum();
    let equal_count = counts[split as usize];
    let over_pct = over_count as f64 / total_f * 100.0;
    let under_pct = under_count as f64 / total_f * 100.0;
    let equal_pct = equal_count as f64 / total_f * 100.0;

    // Trailing same-parity run, scanning backwards from the newest tick.
    let last_parity = window[total - 1].last_digit % 2;
    let parity_streak = window
        .iter()
        .rev()
        .take_while(|t| t.last_digit % 2 == last_parity)
        .count();

    Ok(DigitStatistics {
        total,
        counts,
        percentages,
        even_count,
        odd_count,
        even_pct,
        odd_pct,
        split_digit: split,
        over_count,
        under_count,
        equal_count,
        over_pct,
        under_pct,
        equal_pct,
        deviations,
        hot_digits,
        cold_digits,
        parity_streak,
        distinct_digits,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
