//! Bot registry.
//!
//! A concurrency-safe map from bot id to an owned orchestrator handle,
//! with lifecycle (create/start/stop/delete) as explicit state
//! transitions. Each bot owns its runtime state, risk limits, and
//! recovery controller; the registry only hands out read snapshots and
//! applies risk-limit updates between cycles.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::config::BotParams;
use crate::gateway::{ExecutionGateway, MarketFeed, TradeStore};
use crate::risk::{RiskLimits, RiskLimitsPatch};
use crate::types::{BotRuntimeState, BotStatus, EngineError, RecoveryState};

use super::orchestrator::BotOrchestrator;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

struct BotEntry {
    params: BotParams,
    state: Arc<RwLock<BotRuntimeState>>,
    limits: Arc<RwLock<RiskLimits>>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl BotEntry {
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// Recovery snapshot exposed on the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryInfo {
    pub state: RecoveryState,
    pub max_steps: u32,
    pub max_repeats: u32,
    pub next_stake: f64,
    pub stake_ceiling: f64,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct BotRegistry {
    feed: Arc<dyn MarketFeed>,
    executor: Arc<dyn ExecutionGateway>,
    store: Arc<dyn TradeStore>,
    bots: RwLock<HashMap<Uuid, BotEntry>>,
}

impl BotRegistry {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        executor: Arc<dyn ExecutionGateway>,
        store: Arc<dyn TradeStore>,
    ) -> Self {
        Self {
            feed,
            executor,
            store,
            bots: RwLock::new(HashMap::new()),
        }
    }

    /// Create a bot from validated parameters. The bot starts STOPPED —
    /// call `start` to enter the decision loop.
    pub async fn create(&self, params: BotParams) -> Result<Uuid, EngineError> {
        params.validate()?;

        let bot_id = Uuid::new_v4();
        let mut state = BotRuntimeState::new(
            bot_id,
            &params.name,
            &params.instrument,
            params.initial_balance,
        );
        state.status = BotStatus::Stopped;

        let entry = BotEntry {
            limits: Arc::new(RwLock::new(params.limits)),
            state: Arc::new(RwLock::new(state)),
            params,
            stop_tx: None,
            task: None,
        };

        self.bots.write().await.insert(bot_id, entry);
        info!(bot_id = %bot_id, "Bot created");
        Ok(bot_id)
    }

    /// Spawn the decision loop for a bot.
    pub async fn start(&self, bot_id: Uuid) -> Result<(), EngineError> {
        let mut bots = self.bots.write().await;
        let entry = bots
            .get_mut(&bot_id)
            .ok_or(EngineError::BotNotFound(bot_id))?;

        if entry.is_running() {
            return Err(EngineError::AlreadyRunning(bot_id));
        }

        {
            let mut state = entry.state.write().await;
            state.status = BotStatus::Starting;
            state.stop_reason = None;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let orchestrator = BotOrchestrator::new(
            bot_id,
            entry.params.clone(),
            entry.state.clone(),
            entry.limits.clone(),
            self.feed.clone(),
            self.executor.clone(),
            self.store.clone(),
            stop_rx,
        );
        entry.stop_tx = Some(stop_tx);
        entry.task = Some(tokio::spawn(orchestrator.run()));
        info!(bot_id = %bot_id, "Bot started");
        Ok(())
    }

    /// Request a cooperative stop and wait for the loop to exit.
    /// Stopping an already-stopped bot is a no-op.
    pub async fn stop(&self, bot_id: Uuid) -> Result<(), EngineError> {
        let (stop_tx, task) = {
            let mut bots = self.bots.write().await;
            let entry = bots
                .get_mut(&bot_id)
                .ok_or(EngineError::BotNotFound(bot_id))?;
            (entry.stop_tx.take(), entry.task.take())
        };

        if let Some(tx) = stop_tx {
            let _ = tx.send(true);
        }
        if let Some(task) = task {
            // Cooperative stop guarantees exit within one cycle.
            let _ = task.await;
        }
        info!(bot_id = %bot_id, "Bot stopped");
        Ok(())
    }

    /// Stop (if needed) and remove a bot.
    pub async fn delete(&self, bot_id: Uuid) -> Result<(), EngineError> {
        self.stop(bot_id).await?;
        self.bots.write().await.remove(&bot_id);
        info!(bot_id = %bot_id, "Bot deleted");
        Ok(())
    }

    /// Read snapshot of a bot's runtime state.
    pub async fn status(&self, bot_id: Uuid) -> Result<BotRuntimeState, EngineError> {
        let bots = self.bots.read().await;
        let entry = bots.get(&bot_id).ok_or(EngineError::BotNotFound(bot_id))?;
        let state = entry.state.read().await.clone();
        Ok(state)
    }

    /// Snapshots of every registered bot.
    pub async fn list(&self) -> Vec<BotRuntimeState> {
        let bots = self.bots.read().await;
        let mut out = Vec::with_capacity(bots.len());
        for entry in bots.values() {
            out.push(entry.state.read().await.clone());
        }
        out.sort_by_key(|s| s.started_at);
        out
    }

    /// Recovery staking snapshot for a bot.
    pub async fn recovery_info(&self, bot_id: Uuid) -> Result<RecoveryInfo, EngineError> {
        let bots = self.bots.read().await;
        let entry = bots.get(&bot_id).ok_or(EngineError::BotNotFound(bot_id))?;
        let recovery = entry.state.read().await.recovery;
        let staking = &entry.params.staking;
        Ok(RecoveryInfo {
            state: recovery,
            max_steps: staking.max_steps,
            max_repeats: staking.max_repeats,
            next_stake: staking.stake_at(recovery.step),
            stake_ceiling: staking.ceiling(),
        })
    }

    /// Apply a partial risk-limit update. The orchestrator reads one
    /// limits snapshot per cycle, so the change lands between cycles,
    /// never in the middle of one.
    pub async fn update_limits(
        &self,
        bot_id: Uuid,
        patch: RiskLimitsPatch,
    ) -> Result<RiskLimits, EngineError> {
        let bots = self.bots.read().await;
        let entry = bots.get(&bot_id).ok_or(EngineError::BotNotFound(bot_id))?;
        let mut limits = entry.limits.write().await;
        let merged = patch.apply(&limits)?;
        *limits = merged;
        info!(bot_id = %bot_id, "Risk limits updated");
        Ok(merged)
    }

    /// Stop every running bot concurrently (process shutdown).
    pub async fn stop_all(&self) {
        let ids: Vec<Uuid> = self.bots.read().await.keys().copied().collect();
        futures::future::join_all(ids.into_iter().map(|id| self.stop(id))).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::simulated::{NullTradeStore, SimulatedExecutor, SimulatedFeed};
    use crate::types::TradeResult;
    use std::time::Duration;

    fn make_registry() -> (BotRegistry, Arc<SimulatedExecutor>) {
        let executor = Arc::new(SimulatedExecutor::new(42));
        let registry = BotRegistry::new(
            Arc::new(SimulatedFeed::new(42)),
            executor.clone(),
            Arc::new(NullTradeStore),
        );
        (registry, executor)
    }

    fn fast_params() -> BotParams {
        BotParams {
            trade_interval_secs: 1,
            window_size: 30,
            ..BotParams::default()
        }
    }

    #[tokio::test]
    async fn test_create_validates_params() {
        let (registry, _) = make_registry();
        let bad = BotParams {
            instrument: "NOT_AN_INDEX".into(),
            ..BotParams::default()
        };
        assert!(matches!(
            registry.create(bad).await,
            Err(EngineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_created_bot_is_stopped() {
        let (registry, _) = make_registry();
        let id = registry.create(fast_params()).await.unwrap();
        let status = registry.status(id).await.unwrap();
        assert_eq!(status.status, BotStatus::Stopped);
        assert_eq!(status.trades_placed, 0);
    }

    #[tokio::test]
    async fn test_unknown_bot_is_not_found() {
        let (registry, _) = make_registry();
        let ghost = Uuid::new_v4();
        assert!(matches!(
            registry.status(ghost).await,
            Err(EngineError::BotNotFound(_))
        ));
        assert!(matches!(
            registry.start(ghost).await,
            Err(EngineError::BotNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_lifecycle() {
        let (registry, executor) = make_registry();
        executor.force_outcome(Some(TradeResult::Win));

        let id = registry.create(fast_params()).await.unwrap();
        registry.start(id).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        let status = registry.status(id).await.unwrap();
        assert_eq!(status.status, BotStatus::Active);
        assert!(status.trades_placed >= 1);

        registry.stop(id).await.unwrap();
        let status = registry.status(id).await.unwrap();
        assert_eq!(status.status, BotStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_rejected() {
        let (registry, _) = make_registry();
        let id = registry.create(fast_params()).await.unwrap();
        registry.start(id).await.unwrap();
        assert!(matches!(
            registry.start(id).await,
            Err(EngineError::AlreadyRunning(_))
        ));
        registry.stop(id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let (registry, _) = make_registry();
        let id = registry.create(fast_params()).await.unwrap();
        registry.start(id).await.unwrap();
        registry.stop(id).await.unwrap();
        // A stopped bot may be started again.
        registry.start(id).await.unwrap();
        registry.stop(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_idempotent() {
        let (registry, _) = make_registry();
        let id = registry.create(fast_params()).await.unwrap();
        registry.stop(id).await.unwrap();
        registry.stop(id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_removes_bot() {
        let (registry, _) = make_registry();
        let id = registry.create(fast_params()).await.unwrap();
        registry.start(id).await.unwrap();
        registry.delete(id).await.unwrap();
        assert!(matches!(
            registry.status(id).await,
            Err(EngineError::BotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_returns_all_bots() {
        let (registry, _) = make_registry();
        registry.create(fast_params()).await.unwrap();
        registry
            .create(BotParams {
                name: "second".into(),
                instrument: "R_50".into(),
                ..fast_params()
            })
            .await
            .unwrap();
        let all = registry.list().await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_recovery_info_fresh_bot() {
        let (registry, _) = make_registry();
        let id = registry.create(fast_params()).await.unwrap();
        let info = registry.recovery_info(id).await.unwrap();
        assert_eq!(info.state.step, 0);
        assert!(!info.state.in_recovery);
        assert!((info.next_stake - 10.0).abs() < 1e-10);
        assert!((info.stake_ceiling - 500.0).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_update_limits_merges_and_validates() {
        let (registry, _) = make_registry();
        let id = registry.create(fast_params()).await.unwrap();

        let merged = registry
            .update_limits(
                id,
                RiskLimitsPatch {
                    take_profit: Some(900.0),
                    ..RiskLimitsPatch::default()
                },
            )
            .await
            .unwrap();
        assert!((merged.take_profit - 900.0).abs() < 1e-10);

        let err = registry
            .update_limits(
                id,
                RiskLimitsPatch {
                    max_trade_frac: Some(5.0),
                    ..RiskLimitsPatch::default()
                },
            )
            .await;
        assert!(matches!(err, Err(EngineError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all() {
        let (registry, _) = make_registry();
        let a = registry.create(fast_params()).await.unwrap();
        let b = registry.create(fast_params()).await.unwrap();
        registry.start(a).await.unwrap();
        registry.start(b).await.unwrap();

        registry.stop_all().await;
        assert_eq!(registry.status(a).await.unwrap().status, BotStatus::Stopped);
        assert_eq!(registry.status(b).await.unwrap().status, BotStatus::Stopped);
    }
}
