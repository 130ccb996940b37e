//! Simulated market feed and execution backend.
//!
//! Stands in for the vendor gateway wherever no live connection is
//! wired up: the feed generates a seeded random-walk price series per
//! instrument, and the executor settles contracts from a win
//! probability derived from signal confidence. Both are ordinary
//! implementations of the gateway traits, swappable with a live
//! backend without touching the engine.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;
use tracing::debug;

use super::{ExecutionGateway, MarketFeed, Submission, TradeStore};
use crate::types::{Decision, Outcome, TickSample, TradeResult};

/// Ticks retained per instrument.
const HISTORY_CAP: usize = 2000;

/// New ticks appended to the walk on every fetch.
const TICK_BURST: usize = 5;

// ---------------------------------------------------------------------------
// Simulated feed
// ---------------------------------------------------------------------------

struct FeedState {
    price: f64,
    rng: StdRng,
    history: VecDeque<TickSample>,
}

/// Seeded random-walk tick source. Each instrument gets an independent
/// walk derived from the feed seed, so runs are reproducible.
pub struct SimulatedFeed {
    seed: u64,
    precision: u32,
    state: Mutex<HashMap<String, FeedState>>,
}

impl SimulatedFeed {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            precision: 2,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Override the quoted decimal precision (default 2).
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    /// Seed an instrument's history with known digits (tests/replay).
    pub fn preload(&self, instrument: &str, digits: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entry(instrument.to_string())
            .or_insert_with(|| self.fresh_state(instrument));
        for &d in digits {
            entry
                .history
                .push_back(TickSample::with_digit(instrument, d, Utc::now()));
        }
        while entry.history.len() > HISTORY_CAP {
            entry.history.pop_front();
        }
    }

    fn fresh_state(&self, instrument: &str) -> FeedState {
        let mut hasher = DefaultHasher::new();
        instrument.hash(&mut hasher);
        FeedState {
            price: 100.0,
            rng: StdRng::seed_from_u64(self.seed ^ hasher.finish()),
            history: VecDeque::new(),
        }
    }

    fn advance(state: &mut FeedState, instrument: &str, precision: u32, n: usize) {
        for _ in 0..n {
            state.price += state.rng.gen_range(-0.05..=0.05);
            // Keep the walk away from zero so digits stay well-defined.
            if state.price < 1.0 {
                state.price = 1.0;
            }
            state
                .history
                .push_back(TickSample::from_price(instrument, state.price, Utc::now(), precision));
            if state.history.len() > HISTORY_CAP {
                state.history.pop_front();
            }
        }
    }
}

#[async_trait]
impl MarketFeed for SimulatedFeed {
    async fn recent_ticks(&self, instrument: &str, count: usize) -> Result<Vec<TickSample>> {
        let mut map = self.state.lock().unwrap();
        let state = map
            .entry(instrument.to_string())
            .or_insert_with(|| self.fresh_state(instrument));

        // Advance the walk; backfill when the cache is still short.
        let needed = count.saturating_sub(state.history.len()).max(TICK_BURST);
        Self::advance(state, instrument, self.precision, needed);

        let start = state.history.len().saturating_sub(count);
        Ok(state.history.iter().skip(start).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Simulated executor
// ---------------------------------------------------------------------------

/// Settles decisions from a confidence-derived win probability with a
/// fixed payout ratio. With a settle delay configured, settlement comes
/// back as a pending channel instead of an immediate outcome.
pub struct SimulatedExecutor {
    payout_ratio: f64,
    settle_delay: Option<Duration>,
    forced: Mutex<Option<TradeResult>>,
    rng: Mutex<StdRng>,
}

impl SimulatedExecutor {
    pub fn new(seed: u64) -> Self {
        Self {
            payout_ratio: 0.95,
            settle_delay: None,
            forced: Mutex::new(None),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Settle asynchronously after the given delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    pub fn with_payout_ratio(mut self, ratio: f64) -> Self {
        self.payout_ratio = ratio;
        self
    }

    /// Force every subsequent settlement to the given result
    /// (deterministic tests). Pass `None` to restore random outcomes.
    pub fn force_outcome(&self, result: Option<TradeResult>) {
        *self.forced.lock().unwrap() = result;
    }

    fn settle(&self, decision: &Decision) -> (TradeResult, f64) {
        let result = match *self.forced.lock().unwrap() {
            Some(forced) => forced,
            None => {
                let win_prob = (decision.signal.confidence / 100.0).min(0.95);
                let roll: f64 = self.rng.lock().unwrap().gen();
                if roll < win_prob {
                    TradeResult::Win
                } else {
                    TradeResult::Loss
                }
            }
        };
        let profit = match result {
            TradeResult::Win => decision.stake * self.payout_ratio,
            TradeResult::Loss => -decision.stake,
        };
        (result, profit)
    }
}

#[async_trait]
impl ExecutionGateway for SimulatedExecutor {
    async fn submit(&self, decision: &Decision) -> Result<Submission> {
        let (result, profit) = self.settle(decision);
        debug!(
            decision = %decision,
            result = %result,
            profit = format!("${profit:+.2}"),
            "Simulated settlement"
        );

        match self.settle_delay {
            None => Ok(Submission::Settled(Outcome {
                result,
                profit,
                settled_at: Utc::now(),
            })),
            Some(delay) => {
                let (tx, rx) = oneshot::channel();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Outcome {
                        result,
                        profit,
                        settled_at: Utc::now(),
                    });
                });
                Ok(Submission::Pending(rx))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// No-op store
// ---------------------------------------------------------------------------

/// Discards trade records. Useful when no durability is wanted.
pub struct NullTradeStore;

#[async_trait]
impl TradeStore for NullTradeStore {
    async fn record(&self, _decision: &Decision, _outcome: &Outcome) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContractFamily, TradeDirection, TradeSignal};
    use uuid::Uuid;

    fn make_decision(confidence: f64, stake: f64) -> Decision {
        Decision::new(
            Uuid::new_v4(),
            TradeSignal {
                instrument: "R_100".into(),
                family: ContractFamily::Parity,
                direction: TradeDirection::Even,
                barrier: None,
                confidence,
                pattern_bonus: 0.0,
                rationale: String::new(),
            },
            stake,
            0,
        )
    }

    #[tokio::test]
    async fn test_feed_returns_requested_count() {
        let feed = SimulatedFeed::new(42);
        let ticks = feed.recent_ticks("R_100", 50).await.unwrap();
        assert_eq!(ticks.len(), 50);
        for t in &ticks {
            assert!(t.last_digit <= 9);
            assert_eq!(t.instrument, "R_100");
        }
    }

    #[tokio::test]
    async fn test_feed_walk_advances_between_calls() {
        let feed = SimulatedFeed::new(42);
        let first = feed.recent_ticks("R_100", 20).await.unwrap();
        let second = feed.recent_ticks("R_100", 20).await.unwrap();
        // The walk moved on, so the newest tick differs.
        assert_ne!(
            first.last().unwrap().price,
            second.last().unwrap().price
        );
    }

    #[tokio::test]
    async fn test_feed_deterministic_per_seed() {
        let a = SimulatedFeed::new(7);
        let b = SimulatedFeed::new(7);
        let ta = a.recent_ticks("R_50", 30).await.unwrap();
        let tb = b.recent_ticks("R_50", 30).await.unwrap();
        let da: Vec<u8> = ta.iter().map(|t| t.last_digit).collect();
        let db: Vec<u8> = tb.iter().map(|t| t.last_digit).collect();
        assert_eq!(da, db);
    }

    #[tokio::test]
    async fn test_feed_instruments_independent() {
        let feed = SimulatedFeed::new(7);
        let a = feed.recent_ticks("R_10", 30).await.unwrap();
        let b = feed.recent_ticks("R_100", 30).await.unwrap();
        let da: Vec<u8> = a.iter().map(|t| t.last_digit).collect();
        let db: Vec<u8> = b.iter().map(|t| t.last_digit).collect();
        assert_ne!(da, db);
    }

    #[tokio::test]
    async fn test_feed_preload() {
        let feed = SimulatedFeed::new(1);
        feed.preload("R_100", &[2, 4, 6, 8, 0]);
        let mut map = feed.state.lock().unwrap();
        let history = &map.get_mut("R_100").unwrap().history;
        let digits: Vec<u8> = history.iter().map(|t| t.last_digit).collect();
        assert_eq!(digits, vec![2, 4, 6, 8, 0]);
    }

    #[tokio::test]
    async fn test_executor_forced_win() {
        let exec = SimulatedExecutor::new(1);
        exec.force_outcome(Some(TradeResult::Win));
        let decision = make_decision(60.0, 10.0);
        match exec.submit(&decision).await.unwrap() {
            Submission::Settled(outcome) => {
                assert_eq!(outcome.result, TradeResult::Win);
                assert!((outcome.profit - 9.5).abs() < 1e-10);
            }
            Submission::Pending(_) => panic!("expected synchronous settlement"),
        }
    }

    #[tokio::test]
    async fn test_executor_forced_loss() {
        let exec = SimulatedExecutor::new(1);
        exec.force_outcome(Some(TradeResult::Loss));
        let decision = make_decision(60.0, 25.0);
        match exec.submit(&decision).await.unwrap() {
            Submission::Settled(outcome) => {
                assert_eq!(outcome.result, TradeResult::Loss);
                assert!((outcome.profit - (-25.0)).abs() < 1e-10);
            }
            Submission::Pending(_) => panic!("expected synchronous settlement"),
        }
    }

    #[tokio::test]
    async fn test_executor_pending_settlement() {
        let exec = SimulatedExecutor::new(1).with_settle_delay(Duration::from_millis(10));
        exec.force_outcome(Some(TradeResult::Win));
        let decision = make_decision(60.0, 10.0);
        match exec.submit(&decision).await.unwrap() {
            Submission::Pending(rx) => {
                let outcome = rx.await.unwrap();
                assert_eq!(outcome.result, TradeResult::Win);
            }
            Submission::Settled(_) => panic!("expected pending settlement"),
        }
    }

    #[tokio::test]
    async fn test_executor_seeded_reproducible() {
        let run = |seed: u64| async move {
            let exec = SimulatedExecutor::new(seed);
            let mut results = Vec::new();
            for _ in 0..10 {
                match exec.submit(&make_decision(55.0, 10.0)).await.unwrap() {
                    Submission::Settled(o) => results.push(o.result),
                    Submission::Pending(_) => unreachable!(),
                }
            }
            results
        };
        assert_eq!(run(99).await, run(99).await);
    }

    #[tokio::test]
    async fn test_null_store_accepts_everything() {
        let store = NullTradeStore;
        let decision = make_decision(60.0, 10.0);
        let outcome = Outcome {
            result: TradeResult::Win,
            profit: 9.5,
            settled_at: Utc::now(),
        };
        assert!(store.record(&decision, &outcome).await.is_ok());
    }
}
