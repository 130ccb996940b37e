//! Market-data and execution collaborators.
//!
//! Defines the seams the decision engine consumes: a tick feed, an
//! execution gateway, and a trade-durability hook. The engine only ever
//! sees these traits — the simulated backend ships in-tree, a live
//! vendor gateway plugs in behind the same contracts.

pub mod simulated;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::types::{Decision, Outcome, TickSample};

/// Settlement of a submitted decision. Execution backends may settle
/// synchronously (simulated fills) or hand back a pending channel that
/// resolves when the contract closes — the orchestrator supports both
/// without changing its state machine.
#[derive(Debug)]
pub enum Submission {
    Settled(Outcome),
    Pending(oneshot::Receiver<Outcome>),
}

/// Read-only access to the tick cache for an instrument.
///
/// Implementations may return fewer ticks than requested and must never
/// block indefinitely; callers still apply their own bounded timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// The most recent `count` ticks, oldest first, most-recent-last.
    async fn recent_ticks(&self, instrument: &str, count: usize) -> Result<Vec<TickSample>>;
}

/// Contract execution venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Submit a decision for execution.
    async fn submit(&self, decision: &Decision) -> Result<Submission>;
}

/// Fire-and-forget durability hook for settled trades. Failures are
/// logged by the caller and never abort the decision loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn record(&self, decision: &Decision, outcome: &Outcome) -> Result<()>;
}
