//! API route handlers.
//!
//! All endpoints return JSON. The registry is shared via `Arc` and all
//! handlers go through it — no handler touches a bot's state directly.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::BotParams;
use crate::engine::registry::{BotRegistry, RecoveryInfo};
use crate::risk::{RiskLimits, RiskLimitsPatch};
use crate::types::{BotRuntimeState, EngineError, KNOWN_INSTRUMENTS};

pub type AppState = Arc<BotRegistry>;

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentInfo {
    pub symbol: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub bot_id: Uuid,
    pub name: String,
    pub instrument: String,
    pub status: String,
    pub stop_reason: Option<String>,
    /// Set when the bot stopped by reaching its profit target.
    pub stopped_on_target: bool,
    pub balance: f64,
    pub initial_balance: f64,
    pub daily_pnl: f64,
    pub trades_placed: u64,
    pub trades_won: u64,
    pub trades_lost: u64,
    pub win_rate: f64,
    pub current_streak: u64,
    pub best_streak: u64,
    pub cycle_count: u64,
    pub recovery_step: u32,
    pub in_recovery: bool,
    pub trades_per_hour: f64,
    pub uptime_secs: i64,
}

impl From<BotRuntimeState> for StatusResponse {
    fn from(state: BotRuntimeState) -> Self {
        Self {
            bot_id: state.bot_id,
            name: state.name.clone(),
            instrument: state.instrument.clone(),
            status: state.status.to_string(),
            stop_reason: state.stop_reason.map(|r| r.to_string()),
            stopped_on_target: state.stop_reason.is_some_and(|r| r.is_success()),
            balance: state.balance,
            initial_balance: state.initial_balance,
            daily_pnl: state.daily_pnl,
            trades_placed: state.trades_placed,
            trades_won: state.trades_won,
            trades_lost: state.trades_lost,
            win_rate: state.win_rate(),
            current_streak: state.current_streak,
            best_streak: state.best_streak,
            cycle_count: state.cycle_count,
            recovery_step: state.recovery.step,
            in_recovery: state.recovery.in_recovery,
            trades_per_hour: state.trades_per_hour(),
            uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedResponse {
    pub bot_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Engine errors mapped onto HTTP statuses.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::BotNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::AlreadyRunning(_) => StatusCode::CONFLICT,
            EngineError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/instruments
pub async fn get_instruments() -> Json<Vec<InstrumentInfo>> {
    Json(
        KNOWN_INSTRUMENTS
            .iter()
            .map(|(symbol, name)| InstrumentInfo {
                symbol: symbol.to_string(),
                name: name.to_string(),
            })
            .collect(),
    )
}

/// GET /api/bots
pub async fn list_bots(State(registry): State<AppState>) -> Json<Vec<StatusResponse>> {
    Json(
        registry
            .list()
            .await
            .into_iter()
            .map(StatusResponse::from)
            .collect(),
    )
}

/// POST /api/bots
pub async fn create_bot(
    State(registry): State<AppState>,
    Json(params): Json<BotParams>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let bot_id = registry.create(params).await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { bot_id })))
}

/// POST /api/bots/:id/start
pub async fn start_bot(
    State(registry): State<AppState>,
    Path(bot_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    registry.start(bot_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/bots/:id/stop
pub async fn stop_bot(
    State(registry): State<AppState>,
    Path(bot_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    registry.stop(bot_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/bots/:id
pub async fn delete_bot(
    State(registry): State<AppState>,
    Path(bot_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    registry.delete(bot_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/bots/:id/status
pub async fn get_status(
    State(registry): State<AppState>,
    Path(bot_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    let state = registry.status(bot_id).await?;
    Ok(Json(state.into()))
}

/// GET /api/bots/:id/recovery
pub async fn get_recovery(
    State(registry): State<AppState>,
    Path(bot_id): Path<Uuid>,
) -> Result<Json<RecoveryInfo>, ApiError> {
    Ok(Json(registry.recovery_info(bot_id).await?))
}

/// PUT /api/bots/:id/limits
pub async fn update_limits(
    State(registry): State<AppState>,
    Path(bot_id): Path<Uuid>,
    Json(patch): Json<RiskLimitsPatch>,
) -> Result<Json<RiskLimits>, ApiError> {
    Ok(Json(registry.update_limits(bot_id, patch).await?))
}
