//! Persistence layer.
//!
//! Appends settled trades to a JSONL file, one record per line. This is
//! the `TradeStore` durability hook wired into every bot — writes are
//! fire-and-forget from the engine's perspective, so a full disk slows
//! nothing down and loses nothing but history.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::gateway::TradeStore;
use crate::types::{Decision, Outcome, TradeRecord};

/// Default trade log path.
const DEFAULT_TRADE_LOG: &str = "volbot_trades.jsonl";

// ---------------------------------------------------------------------------
// JSONL trade log
// ---------------------------------------------------------------------------

/// Append-only JSONL trade history shared by all bots in the process.
pub struct TradeLog {
    path: PathBuf,
    // Serialises appends so concurrent bots never interleave lines.
    write_lock: Mutex<()>,
}

impl TradeLog {
    pub fn new(path: Option<&str>) -> Self {
        Self {
            path: PathBuf::from(path.unwrap_or(DEFAULT_TRADE_LOG)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &TradeRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("Failed to serialise trade record")?;

        let _guard = self.write_lock.lock().unwrap();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open trade log {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("Failed to append to trade log {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            trade_id = %record.id,
            "Trade recorded"
        );
        Ok(())
    }
}

#[async_trait]
impl TradeStore for TradeLog {
    async fn record(&self, decision: &Decision, outcome: &Outcome) -> Result<()> {
        self.append(&TradeRecord::from_settlement(decision, outcome))
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load the full trade history. Returns an empty list when the file
/// doesn't exist yet (fresh start). Malformed lines fail the load —
/// a corrupt history should be noticed, not skipped.
pub fn load_trades(path: &Path) -> Result<Vec<TradeRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trade log {}", path.display()))?;

    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .with_context(|| format!("Malformed trade record in {}", path.display()))
        })
        .collect()
}

/// Load only the trades belonging to one bot.
pub fn load_trades_for(path: &Path, bot_id: Uuid) -> Result<Vec<TradeRecord>> {
    Ok(load_trades(path)?
        .into_iter()
        .filter(|t| t.bot_id == bot_id)
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContractFamily, TradeDirection, TradeResult, TradeSignal};
    use chrono::Utc;

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("volbot_test_trades_{}.jsonl", Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn make_settlement(bot_id: Uuid, stake: f64) -> (Decision, Outcome) {
        let signal = TradeSignal {
            instrument: "R_100".into(),
            family: ContractFamily::Parity,
            direction: TradeDirection::Even,
            barrier: None,
            confidence: 60.0,
            pattern_bonus: 0.0,
            rationale: "test".into(),
        };
        let decision = Decision::new(bot_id, signal, stake, 0);
        let outcome = Outcome {
            result: TradeResult::Win,
            profit: stake * 0.95,
            settled_at: Utc::now(),
        };
        (decision, outcome)
    }

    #[test]
    fn test_record_and_load_roundtrip() {
        let path = temp_path();
        let log = TradeLog::new(Some(&path));
        let bot_id = Uuid::new_v4();

        let (decision, outcome) = make_settlement(bot_id, 10.0);
        tokio_test::block_on(log.record(&decision, &outcome)).unwrap();

        let trades = load_trades(Path::new(&path)).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, decision.id);
        assert_eq!(trades[0].bot_id, bot_id);
        assert!((trades[0].profit - 9.5).abs() < 1e-10);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_appends_accumulate() {
        let path = temp_path();
        let log = TradeLog::new(Some(&path));
        let bot_id = Uuid::new_v4();

        for i in 0..5 {
            let (decision, outcome) = make_settlement(bot_id, 10.0 + i as f64);
            tokio_test::block_on(log.record(&decision, &outcome)).unwrap();
        }

        let trades = load_trades(Path::new(&path)).unwrap();
        assert_eq!(trades.len(), 5);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_nonexistent_is_empty() {
        let trades = load_trades(Path::new("/tmp/volbot_nonexistent_98765.jsonl")).unwrap();
        assert!(trades.is_empty());
    }

    #[test]
    fn test_load_trades_for_filters_by_bot() {
        let path = temp_path();
        let log = TradeLog::new(Some(&path));
        let bot_a = Uuid::new_v4();
        let bot_b = Uuid::new_v4();

        for bot in [bot_a, bot_a, bot_b] {
            let (decision, outcome) = make_settlement(bot, 10.0);
            tokio_test::block_on(log.record(&decision, &outcome)).unwrap();
        }

        let trades_a = load_trades_for(Path::new(&path), bot_a).unwrap();
        let trades_b = load_trades_for(Path::new(&path), bot_b).unwrap();
        assert_eq!(trades_a.len(), 2);
        assert_eq!(trades_b.len(), 1);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_malformed_line_fails_load() {
        let path = temp_path();
        std::fs::write(&path, "{not json}\n").unwrap();
        assert!(load_trades(Path::new(&path)).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
