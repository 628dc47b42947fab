//! HTTP API for the treasury daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Treasury state, epoch status, fee preview and event log
//! - Partner operations (deposit, pre-inform, withdraw)
//! - Trader operations (swap, fee withdrawal, fee recipient)
//! - Permissionless harvest and owner reserve sync
//!
//! Callers identify themselves with a `caller` field in the request body.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use treasury_domain::{
    Amount, AssetId, Principal, Timestamp, Treasury, TreasuryError, TreasuryEvent,
};
use treasury_engine::{EpochStatus, FeeAssessment};
use treasury_exec::{
    AssetTransferPort, ExecError, Executor, PriceOraclePort, Receipt, SwapVenuePort,
};
use treasury_store::{Store, StoredEvent};

use crate::error::DaemonError;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<L, V, O, S>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    pub executor: Arc<Executor<L, V, O, S>>,
    pub treasury_id: Uuid,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Treasury state as exposed over HTTP.
#[derive(Debug, Serialize, Deserialize)]
pub struct TreasurySummary {
    pub id: Uuid,
    pub account: Principal,
    pub initialized: bool,
    pub reserve_a: Amount,
    pub reserve_b: Amount,
    pub pending_a: Amount,
    pub pending_b: Amount,
    pub last_withdraw_epoch_start: Timestamp,
    pub last_fee_harvest_time: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_recipient: Option<Principal>,
}

/// Response to a committed operation.
#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub treasury: TreasurySummary,
    pub events: Vec<TreasuryEvent>,
}

/// Deposit, pre-inform and withdraw requests.
#[derive(Debug, Deserialize)]
pub struct AmountsRequest {
    pub caller: Principal,
    #[serde(default)]
    pub amount_a: Amount,
    #[serde(default)]
    pub amount_b: Amount,
}

/// Trader swap request.
#[derive(Debug, Deserialize)]
pub struct SwapBody {
    pub caller: Principal,
    /// Defaults to the treasury's configured venue
    #[serde(default)]
    pub router: Option<Principal>,
    pub asset_in: AssetId,
    pub amount_in: Amount,
}

/// Manual fee withdrawal request.
#[derive(Debug, Deserialize)]
pub struct WithdrawFeeRequest {
    pub caller: Principal,
    #[serde(default)]
    pub min_out_a: Amount,
    #[serde(default)]
    pub min_out_b: Amount,
    pub output_asset: AssetId,
    pub recipient: Principal,
}

/// Fee recipient change request.
#[derive(Debug, Deserialize)]
pub struct FeeRecipientRequest {
    pub caller: Principal,
    pub recipient: Principal,
}

/// Request carrying only the caller.
#[derive(Debug, Deserialize)]
pub struct CallerRequest {
    pub caller: Principal,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<L, V, O, S>(state: Arc<ApiState<L, V, O, S>>) -> Router
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/treasury", get(treasury_handler))
        .route("/treasury/epoch", get(epoch_handler))
        .route("/treasury/fee", get(fee_preview_handler))
        .route("/treasury/events", get(events_handler))
        .route("/treasury/deposit", post(deposit_handler))
        .route("/treasury/pre-inform", post(pre_inform_handler))
        .route("/treasury/withdraw", post(withdraw_handler))
        .route("/treasury/swap", post(swap_handler))
        .route("/treasury/harvest", post(harvest_handler))
        .route("/treasury/withdraw-fee", post(withdraw_fee_handler))
        .route("/treasury/fee-recipient", post(fee_recipient_handler))
        .route("/treasury/sync", post(sync_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn treasury_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
) -> Result<Json<TreasurySummary>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let treasury = state.executor.treasury(state.treasury_id).await.map_err(exec_error)?;
    Ok(Json(summarize(&treasury)))
}

async fn epoch_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
) -> Result<Json<EpochStatus>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let status = state.executor.epoch_status(state.treasury_id).await.map_err(exec_error)?;
    Ok(Json(status))
}

/// Fee a harvest would take at the current oracle price.
async fn fee_preview_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
) -> Result<Json<FeeAssessment>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let assessment = state.executor.preview_fee(state.treasury_id).await.map_err(exec_error)?;
    Ok(Json(assessment))
}

async fn events_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
) -> Result<Json<Vec<StoredEvent>>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let events = state.executor.events(state.treasury_id).await.map_err(exec_error)?;
    Ok(Json(events))
}

async fn deposit_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
    Json(req): Json<AmountsRequest>,
) -> Result<Json<ReceiptResponse>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let receipt = state
        .executor
        .deposit(state.treasury_id, &req.caller, req.amount_a, req.amount_b)
        .await
        .map_err(exec_error)?;
    Ok(Json(to_response(receipt)))
}

async fn pre_inform_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
    Json(req): Json<AmountsRequest>,
) -> Result<Json<ReceiptResponse>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let receipt = state
        .executor
        .pre_inform(state.treasury_id, &req.caller, req.amount_a, req.amount_b)
        .await
        .map_err(exec_error)?;
    Ok(Json(to_response(receipt)))
}

async fn withdraw_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
    Json(req): Json<AmountsRequest>,
) -> Result<Json<ReceiptResponse>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let receipt = state
        .executor
        .withdraw(state.treasury_id, &req.caller, req.amount_a, req.amount_b)
        .await
        .map_err(exec_error)?;
    Ok(Json(to_response(receipt)))
}

async fn swap_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
    Json(req): Json<SwapBody>,
) -> Result<Json<ReceiptResponse>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let router = match req.router {
        Some(router) => router,
        None => {
            let treasury = state.executor.treasury(state.treasury_id).await.map_err(exec_error)?;
            treasury.terms().map_err(|e| exec_error(e.into()))?.venue.clone()
        },
    };

    let receipt = state
        .executor
        .swap(state.treasury_id, &req.caller, &router, &req.asset_in, req.amount_in)
        .await
        .map_err(exec_error)?;
    Ok(Json(to_response(receipt)))
}

/// Permissionless; anyone may trigger a due harvest.
async fn harvest_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
) -> Result<Json<ReceiptResponse>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let receipt = state.executor.harvest(state.treasury_id).await.map_err(exec_error)?;
    Ok(Json(to_response(receipt)))
}

async fn withdraw_fee_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
    Json(req): Json<WithdrawFeeRequest>,
) -> Result<Json<ReceiptResponse>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let receipt = state
        .executor
        .withdraw_fee(
            state.treasury_id,
            &req.caller,
            req.min_out_a,
            req.min_out_b,
            &req.output_asset,
            &req.recipient,
        )
        .await
        .map_err(exec_error)?;
    Ok(Json(to_response(receipt)))
}

async fn fee_recipient_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
    Json(req): Json<FeeRecipientRequest>,
) -> Result<Json<ReceiptResponse>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let receipt = state
        .executor
        .set_fee_recipient(state.treasury_id, &req.caller, req.recipient)
        .await
        .map_err(exec_error)?;
    Ok(Json(to_response(receipt)))
}

async fn sync_handler<L, V, O, S>(
    State(state): State<Arc<ApiState<L, V, O, S>>>,
    Json(req): Json<CallerRequest>,
) -> Result<Json<ReceiptResponse>, ApiError>
where
    L: AssetTransferPort + 'static,
    V: SwapVenuePort + 'static,
    O: PriceOraclePort + 'static,
    S: Store + 'static,
{
    let receipt = state
        .executor
        .sync_reserves(state.treasury_id, &req.caller)
        .await
        .map_err(exec_error)?;
    Ok(Json(to_response(receipt)))
}

// =============================================================================
// Helpers
// =============================================================================

fn exec_error(error: ExecError) -> ApiError {
    to_error_response(DaemonError::from(error))
}

/// HTTP status for a daemon error.
pub fn status_for(error: &DaemonError) -> StatusCode {
    if let Some(rejection) = error.as_treasury() {
        return match rejection {
            TreasuryError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            TreasuryError::NotInitializable
            | TreasuryError::AlreadyInitialized
            | TreasuryError::NotInitialized
            | TreasuryError::WindowClosed { .. }
            | TreasuryError::AlreadyHarvestedThisEpoch { .. } => StatusCode::CONFLICT,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
    }

    match error {
        DaemonError::Exec(ExecError::NotFound(_)) => StatusCode::NOT_FOUND,
        DaemonError::Exec(ExecError::ExternalCall(_)) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn to_error_response(error: DaemonError) -> ApiError {
    (status_for(&error), Json(ErrorResponse { error: error.to_string() }))
}

fn summarize(treasury: &Treasury) -> TreasurySummary {
    let (pending_a, pending_b) = treasury.pending_amounts();
    TreasurySummary {
        id: treasury.id,
        account: treasury.account.clone(),
        initialized: treasury.is_initialized(),
        reserve_a: treasury.reserves.a,
        reserve_b: treasury.reserves.b,
        pending_a,
        pending_b,
        last_withdraw_epoch_start: treasury.last_withdraw_epoch_start,
        last_fee_harvest_time: treasury.last_fee_harvest_time,
        fee_recipient: treasury.fee_recipient.clone(),
    }
}

fn to_response(receipt: Receipt) -> ReceiptResponse {
    ReceiptResponse { treasury: summarize(&receipt.treasury), events: receipt.events }
}

// =============================================================================
// Tests
// =============================================================================
